#![forbid(unsafe_code)]

//! One task and its reactive fields.
//!
//! An [`Item`] is a cheap handle; clones refer to the same task and compare
//! equal by [`ItemId`], never by content.
//!
//! Each item wires one behavior into itself at creation: whenever `valid` is
//! written `false`, `editing` is forced back to `true`. `valid` notifies on
//! every write, so re-asserting an invalid title re-enters edit mode even if
//! the flag was already `false`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tickbox_reactive::{Observable, Runtime, Subscription};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item{}", self.0)
    }
}

/// Persisted shape of an item. Transient UI state is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

impl ItemRecord {
    #[must_use]
    pub fn new(title: impl Into<String>, completed: bool) -> Self {
        Self {
            title: title.into(),
            completed,
        }
    }
}

struct ItemInner {
    id: ItemId,
    title: Observable<String>,
    completed: Observable<bool>,
    editing: Observable<bool>,
    valid: Observable<bool>,
    subscriptions: RefCell<Vec<Subscription>>,
}

#[derive(Clone)]
pub struct Item {
    inner: Rc<ItemInner>,
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Item {}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.inner.id)
            .field("title", &self.inner.title.peek())
            .field("completed", &self.inner.completed.peek())
            .field("editing", &self.inner.editing.peek())
            .field("valid", &self.inner.valid.peek())
            .finish()
    }
}

impl Item {
    pub fn new(rt: &Runtime, title: impl Into<String>, completed: bool) -> Self {
        let id = ItemId::next();
        let title = Observable::distinct(rt, title.into()).labeled(format!("{id}.title"));
        let completed = Observable::new(rt, completed).labeled(format!("{id}.completed"));
        let editing = Observable::new(rt, false).labeled(format!("{id}.editing"));
        let valid = Observable::new(rt, true).labeled(format!("{id}.valid"));

        let reopen = editing.clone();
        let on_invalid = valid.subscribe(move |valid| {
            if !*valid {
                reopen.set(true);
            }
        });

        Self {
            inner: Rc::new(ItemInner {
                id,
                title,
                completed,
                editing,
                valid,
                subscriptions: RefCell::new(vec![on_invalid]),
            }),
        }
    }

    pub fn from_record(rt: &Runtime, record: &ItemRecord) -> Self {
        Self::new(rt, record.title.clone(), record.completed)
    }

    /// Snapshot of the persisted fields. Reads are tracked.
    #[must_use]
    pub fn record(&self) -> ItemRecord {
        ItemRecord {
            title: self.title(),
            completed: self.is_completed(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.inner.id
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.inner.title.get()
    }

    /// Write the live title. Writes equal to the current title are dropped.
    pub fn set_title(&self, title: impl Into<String>) {
        self.inner.title.set(title.into());
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.completed.get()
    }

    pub fn set_completed(&self, completed: bool) {
        self.inner.completed.set(completed);
    }

    pub fn toggle(&self) {
        self.set_completed(!self.inner.completed.peek());
    }

    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.inner.editing.get()
    }

    pub fn set_editing(&self, editing: bool) {
        self.inner.editing.set(editing);
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.valid.get()
    }

    pub fn set_valid(&self, valid: bool) {
        self.inner.valid.set(valid);
    }

    #[must_use]
    pub fn title_cell(&self) -> &Observable<String> {
        &self.inner.title
    }

    #[must_use]
    pub fn completed_cell(&self) -> &Observable<bool> {
        &self.inner.completed
    }

    #[must_use]
    pub fn editing_cell(&self) -> &Observable<bool> {
        &self.inner.editing
    }

    #[must_use]
    pub fn valid_cell(&self) -> &Observable<bool> {
        &self.inner.valid
    }

    /// Keep `subscription` alive for as long as this item exists.
    pub(crate) fn hold(&self, subscription: Subscription) {
        self.inner.subscriptions.borrow_mut().push(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickbox_reactive::NotifyPolicy;

    #[test]
    fn new_item_defaults() {
        let rt = Runtime::new();
        let item = Item::new(&rt, "buy milk", false);
        assert_eq!(item.title(), "buy milk");
        assert!(!item.is_completed());
        assert!(!item.is_editing());
        assert!(item.is_valid());
    }

    #[test]
    fn ids_are_unique_and_define_equality() {
        let rt = Runtime::new();
        let a = Item::new(&rt, "same", false);
        let b = Item::new(&rt, "same", false);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(b.id() > a.id());
    }

    #[test]
    fn invalid_forces_editing_even_when_already_invalid() {
        let rt = Runtime::new();
        let item = Item::new(&rt, "t", false);
        item.set_valid(false);
        assert!(item.is_editing());

        item.set_editing(false);
        item.set_valid(false);
        assert!(item.is_editing());
    }

    #[test]
    fn valid_true_leaves_editing_alone() {
        let rt = Runtime::new();
        let item = Item::new(&rt, "t", false);
        item.set_valid(true);
        assert!(!item.is_editing());
    }

    #[test]
    fn cell_policies() {
        let rt = Runtime::new();
        let item = Item::new(&rt, "t", false);
        assert_eq!(item.title_cell().notify_policy(), NotifyPolicy::WhenChanged);
        assert_eq!(item.completed_cell().notify_policy(), NotifyPolicy::Always);
        assert_eq!(item.valid_cell().notify_policy(), NotifyPolicy::Always);
        assert_eq!(item.valid_cell().subscriber_count(), 1);
    }

    #[test]
    fn toggle_and_record() {
        let rt = Runtime::new();
        let item = Item::from_record(&rt, &ItemRecord::new("walk dog", true));
        item.toggle();
        assert_eq!(item.record(), ItemRecord::new("walk dog", false));
    }

    #[test]
    fn record_ignores_unknown_fields_and_defaults_completed() {
        let record: ItemRecord =
            serde_json::from_str(r#"{"title":"a","editing":true,"valid":false}"#).unwrap();
        assert_eq!(record, ItemRecord::new("a", false));
        let json = serde_json::to_string(&ItemRecord::new("b", true)).unwrap();
        assert_eq!(json, r#"{"title":"b","completed":true}"#);
    }
}
