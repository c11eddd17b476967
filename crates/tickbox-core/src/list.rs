#![forbid(unsafe_code)]

//! The collection state engine.
//!
//! [`TodoList`] owns the ordered item sequence, the pending entry and the
//! show-mode cell, and derives everything else from them:
//!
//! | cell              | kind               | reads                                  |
//! |-------------------|--------------------|----------------------------------------|
//! | `filtered_items`  | lazy computed      | show mode, items, `completed` (filtered modes) |
//! | `completed_count` | lazy computed      | items, every `completed`               |
//! | `remaining_count` | lazy computed      | items, `completed_count`               |
//! | `all_completed`   | writable computed  | `remaining_count`                      |
//!
//! Every title cell is subscribed to the cross-title rewrite at item
//! creation. The rewrite writes other titles, which would notify the same
//! handler again; a flag on the list makes nested notifications no-ops so
//! one triggering change rewrites each title exactly once.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tickbox_reactive::{Computed, Observable, Runtime};

use crate::error::Result;
use crate::item::{Item, ItemRecord};
use crate::show_mode::ShowMode;
use crate::validation::{TitleRewrite, ValidationPipeline};

/// What [`TodoList::stop_editing`] did with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The trimmed title was empty; the item is gone.
    Removed,
    /// The title passed validation; editing ended.
    Committed,
    /// The title failed validation; the item stays in edit mode.
    Rejected,
}

struct ListInner {
    rt: Runtime,
    items: Observable<Vec<Item>>,
    current: Observable<String>,
    show_mode: Observable<ShowMode>,
    filtered: Computed<Vec<Item>>,
    completed_count: Computed<usize>,
    remaining_count: Computed<usize>,
    all_completed: Computed<bool>,
    pipeline: ValidationPipeline,
    rewrite: TitleRewrite,
    rewriting: Cell<bool>,
    this: Weak<ListInner>,
}

/// Resets the rewrite flag even if a subscriber panics mid-rewrite.
struct RewriteScope<'a>(&'a Cell<bool>);

impl<'a> RewriteScope<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for RewriteScope<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ListInner {
    fn create_item(this: &Weak<ListInner>, rt: &Runtime, title: String, completed: bool) -> Item {
        let item = Item::new(rt, title, completed);
        let list = this.clone();
        let on_title = item.title_cell().subscribe(move |title: &String| {
            if let Some(list) = list.upgrade() {
                list.on_title_changed(title);
            }
        });
        item.hold(on_title);
        item
    }

    fn on_title_changed(&self, title: &str) {
        if !self.rewrite.triggers(title) {
            return;
        }
        let Some(_scope) = RewriteScope::enter(&self.rewriting) else {
            return;
        };
        let items = self.items.peek();
        tracing::debug!(trigger = %title, items = items.len(), "rewriting titles");
        self.rt.batch(|| {
            for item in &items {
                let original = item.title_cell().peek();
                let candidates = self.rewrite.rewrite(&original);
                item.set_title(candidates.swapped);
                item.set_title(candidates.digits);
            }
        });
    }
}

/// The task list view-model.
///
/// Cloning a `TodoList` creates a new handle to the **same** list.
#[derive(Clone)]
pub struct TodoList {
    inner: Rc<ListInner>,
}

impl fmt::Debug for TodoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoList")
            .field("items", &self.inner.items.peek())
            .field("current", &self.inner.current.peek())
            .field("show_mode", &self.inner.show_mode.peek())
            .field("pipeline", &self.inner.pipeline)
            .finish_non_exhaustive()
    }
}

impl TodoList {
    /// Build a list seeded from persisted records, in record order.
    pub fn new(rt: &Runtime, records: &[ItemRecord], pipeline: ValidationPipeline) -> Self {
        Self::with_rewrite(rt, records, pipeline, TitleRewrite::default())
    }

    pub fn with_rewrite(
        rt: &Runtime,
        records: &[ItemRecord],
        pipeline: ValidationPipeline,
        rewrite: TitleRewrite,
    ) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<ListInner>| {
            let seeded: Vec<Item> = records
                .iter()
                .map(|record| {
                    ListInner::create_item(this, rt, record.title.clone(), record.completed)
                })
                .collect();
            let items = Observable::new(rt, seeded).labeled("todos");
            let current = Observable::new(rt, String::new()).labeled("current");
            let show_mode = Observable::new(rt, ShowMode::All).labeled("showMode");

            let (mode, all) = (show_mode.clone(), items.clone());
            let filtered = Computed::new(rt, move || {
                let mode = mode.get();
                if mode == ShowMode::All {
                    return all.get();
                }
                all.with(|items| {
                    items
                        .iter()
                        .filter(|item| mode.shows(item.is_completed()))
                        .cloned()
                        .collect()
                })
            })
            .labeled("filteredTodos");

            let all = items.clone();
            let completed_count = Computed::new(rt, move || {
                all.with(|items| items.iter().filter(|item| item.is_completed()).count())
            })
            .labeled("completedCount");

            let (all, completed) = (items.clone(), completed_count.clone());
            let remaining_count = Computed::new(rt, move || {
                let total = all.with(Vec::len);
                total.saturating_sub(completed.get())
            })
            .labeled("remainingCount");

            let (remaining, all) = (remaining_count.clone(), items.clone());
            let all_completed = Computed::writable(
                rt,
                move || remaining.get() == 0,
                move |completed: bool| {
                    // Same-value writes still notify; counts and the save
                    // sink rely on it.
                    for item in all.peek() {
                        item.set_completed(completed);
                    }
                },
            )
            .labeled("allCompleted");

            ListInner {
                rt: rt.clone(),
                items,
                current,
                show_mode,
                filtered,
                completed_count,
                remaining_count,
                all_completed,
                pipeline,
                rewrite,
                rewriting: Cell::new(false),
                this: this.clone(),
            }
        });
        tracing::debug!(items = records.len(), "todo list created");
        Self { inner }
    }

    // ─── Operations ─────────────────────────────────────────────────────────

    /// Commit the pending entry as a new item.
    ///
    /// Blank entries are ignored. A rejected entry is reported through the
    /// pipeline and left in place for the user to fix.
    pub fn add(&self) -> Option<Item> {
        let text = self.inner.current.peek();
        let title = text.trim();
        if title.is_empty() {
            return None;
        }
        if !self.inner.pipeline.validate_title(title) {
            return None;
        }
        let item = ListInner::create_item(&self.inner.this, &self.inner.rt, title.to_owned(), false);
        let pushed = item.clone();
        self.inner.rt.batch(|| {
            self.inner.items.update(|items| items.push(pushed));
            self.inner.current.set(String::new());
        });
        tracing::debug!(id = %item.id(), title = %item.title_cell().peek(), "item added");
        Some(item)
    }

    /// Stage `text` as the pending entry, then [`add`](Self::add) it.
    pub fn add_title(&self, text: impl Into<String>) -> Option<Item> {
        self.inner.current.set(text.into());
        self.add()
    }

    /// Remove `item` by identity. Returns `false` if it is not in the list.
    pub fn remove(&self, item: &Item) -> bool {
        let Some(index) = self.position(item) else {
            return false;
        };
        self.inner.items.update(|items| {
            items.remove(index);
        });
        tracing::debug!(id = %item.id(), "item removed");
        true
    }

    /// Remove every completed item in one change. Returns how many went.
    pub fn remove_completed(&self) -> usize {
        let before = self.inner.items.with(Vec::len);
        let mut removed = 0;
        self.inner.items.update(|items| {
            items.retain(|item| !item.completed_cell().peek());
            removed = before - items.len();
        });
        tracing::debug!(removed, "completed items cleared");
        removed
    }

    pub fn edit_item(&self, item: &Item) {
        item.set_editing(true);
    }

    /// Finish editing `item`.
    ///
    /// The live title is trimmed for the checks only; it is not written back.
    /// An empty title removes the item and skips validation.
    pub fn stop_editing(&self, item: &Item) -> EditOutcome {
        let title = item.title_cell().peek();
        let title = title.trim();
        if title.is_empty() {
            self.remove(item);
            return EditOutcome::Removed;
        }
        if self.inner.pipeline.validate_title(title) {
            item.set_valid(true);
            item.set_editing(false);
            EditOutcome::Committed
        } else {
            item.set_valid(false);
            EditOutcome::Rejected
        }
    }

    /// Write `completed` to every item through the `all_completed` setter.
    pub fn set_all_completed(&self, completed: bool) -> Result<()> {
        self.inner.all_completed.write(completed)?;
        Ok(())
    }

    // ─── State ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn items(&self) -> Vec<Item> {
        self.inner.items.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.with(Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `index` in display order of the full list.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Item> {
        self.inner.items.with(|items| items.get(index).cloned())
    }

    #[must_use]
    pub fn position(&self, item: &Item) -> Option<usize> {
        self.inner
            .items
            .with(|items| items.iter().position(|candidate| candidate == item))
    }

    /// Persisted shape of every item, in order.
    #[must_use]
    pub fn records(&self) -> Vec<ItemRecord> {
        self.inner
            .items
            .with(|items| items.iter().map(Item::record).collect())
    }

    #[must_use]
    pub fn current(&self) -> String {
        self.inner.current.get()
    }

    pub fn set_current(&self, text: impl Into<String>) {
        self.inner.current.set(text.into());
    }

    #[must_use]
    pub fn show_mode(&self) -> ShowMode {
        self.inner.show_mode.get()
    }

    pub fn set_show_mode(&self, mode: ShowMode) {
        self.inner.show_mode.set(mode);
    }

    #[must_use]
    pub fn filtered_items(&self) -> Vec<Item> {
        self.inner.filtered.get()
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.inner.completed_count.get()
    }

    #[must_use]
    pub fn remaining_count(&self) -> usize {
        self.inner.remaining_count.get()
    }

    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.inner.all_completed.get()
    }

    /// `"item"` for exactly one, `"items"` otherwise.
    #[must_use]
    pub fn item_label(count: usize) -> &'static str {
        if count == 1 { "item" } else { "items" }
    }

    // ─── Cells ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn items_cell(&self) -> &Observable<Vec<Item>> {
        &self.inner.items
    }

    #[must_use]
    pub fn current_cell(&self) -> &Observable<String> {
        &self.inner.current
    }

    /// The settable show mode, for a router to drive.
    #[must_use]
    pub fn show_mode_cell(&self) -> &Observable<ShowMode> {
        &self.inner.show_mode
    }

    #[must_use]
    pub fn filtered_cell(&self) -> &Computed<Vec<Item>> {
        &self.inner.filtered
    }

    #[must_use]
    pub fn all_completed_cell(&self) -> &Computed<bool> {
        &self.inner.all_completed
    }

    #[must_use]
    pub fn pipeline(&self) -> &ValidationPipeline {
        &self.inner.pipeline
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.inner.rt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::validation::ErrorReporter;

    fn list_with(titles: &[(&str, bool)]) -> (TodoList, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let reporter: Rc<dyn ErrorReporter> =
            Rc::new(move |msg: &str| sink.borrow_mut().push(msg.to_owned()));
        let records: Vec<_> = titles
            .iter()
            .map(|(title, done)| ItemRecord::new(*title, *done))
            .collect();
        let rt = Runtime::new();
        (TodoList::new(&rt, &records, ValidationPipeline::new(reporter)), log)
    }

    fn titles(list: &TodoList) -> Vec<String> {
        list.items().iter().map(Item::title).collect()
    }

    #[test]
    fn add_trims_and_clears_pending() {
        let (list, log) = list_with(&[]);
        let item = list.add_title("  buy milk  ").unwrap();
        assert_eq!(item.title(), "buy milk");
        assert_eq!(list.len(), 1);
        assert_eq!(list.current(), "");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn add_ignores_blank_entry() {
        let (list, log) = list_with(&[]);
        assert!(list.add_title("   ").is_none());
        assert!(list.is_empty());
        assert_eq!(list.current(), "   ");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn rejected_add_keeps_pending_entry() {
        let (list, log) = list_with(&[]);
        assert!(list.add_title("pay rent").is_none());
        assert!(list.is_empty());
        assert_eq!(list.current(), "pay rent");
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn remove_by_identity() {
        let (list, _) = list_with(&[("same", false), ("same", false)]);
        let second = list.get(1).unwrap();
        assert!(list.remove(&second));
        assert_eq!(list.len(), 1);
        assert_ne!(list.get(0).unwrap(), second);
        assert!(!list.remove(&second));
    }

    #[test]
    fn remove_completed_preserves_order() {
        let (list, _) = list_with(&[
            ("a", false),
            ("b", true),
            ("c", false),
            ("d", true),
            ("e", false),
        ]);
        assert_eq!(list.remove_completed(), 2);
        assert_eq!(titles(&list), vec!["a", "c", "e"]);
    }

    #[test]
    fn filtered_view_follows_mode_and_flags() {
        let (list, _) = list_with(&[("a", false), ("b", true)]);
        assert_eq!(list.filtered_items().len(), 2);

        list.set_show_mode(ShowMode::Active);
        assert_eq!(list.filtered_items(), vec![list.get(0).unwrap()]);

        list.get(0).unwrap().set_completed(true);
        assert!(list.filtered_items().is_empty());

        list.set_show_mode(ShowMode::Completed);
        assert_eq!(list.filtered_items().len(), 2);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn counts_track_flags() {
        let (list, _) = list_with(&[("a", false), ("b", true), ("c", false)]);
        assert_eq!(list.completed_count(), 1);
        assert_eq!(list.remaining_count(), 2);
        list.get(0).unwrap().toggle();
        assert_eq!(list.completed_count(), 2);
        assert_eq!(list.remaining_count(), 1);
        assert!(!list.all_completed());
    }

    #[test]
    fn all_completed_write_is_idempotent() {
        let (list, _) = list_with(&[("a", true), ("b", false)]);
        for _ in 0..2 {
            list.set_all_completed(true).unwrap();
            assert!(list.all_completed());
            assert_eq!(list.remaining_count(), 0);
        }
        list.set_all_completed(false).unwrap();
        assert_eq!(list.completed_count(), 0);
    }

    #[test]
    fn same_value_bulk_write_still_notifies() {
        let (list, _) = list_with(&[("a", true)]);
        let item = list.get(0).unwrap();
        let before = item.completed_cell().version();
        list.set_all_completed(true).unwrap();
        assert_eq!(item.completed_cell().version(), before + 1);
    }

    #[test]
    fn empty_list_is_all_completed() {
        let (list, _) = list_with(&[]);
        assert!(list.all_completed());
    }

    #[test]
    fn stop_editing_empty_removes_without_validating() {
        let (list, log) = list_with(&[("a", false)]);
        let item = list.get(0).unwrap();
        list.edit_item(&item);
        item.set_title("   ");
        assert_eq!(list.stop_editing(&item), EditOutcome::Removed);
        assert!(list.is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn stop_editing_commits_valid_title() {
        let (list, _) = list_with(&[("walk dog", false)]);
        let item = list.get(0).unwrap();
        list.edit_item(&item);
        assert!(item.is_editing());
        assert_eq!(list.stop_editing(&item), EditOutcome::Committed);
        assert!(!item.is_editing());
        assert!(item.is_valid());
    }

    #[test]
    fn stop_editing_rejects_and_stays_in_edit_mode() {
        let (list, log) = list_with(&[("walk dog", false)]);
        let item = list.get(0).unwrap();
        list.edit_item(&item);
        item.set_title("walk pig");
        assert_eq!(list.stop_editing(&item), EditOutcome::Rejected);
        assert!(item.is_editing());
        assert!(!item.is_valid());
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn title_with_x_rewrites_every_title_from_snapshot() {
        let (list, _) = list_with(&[("buy milk", false), ("sell syrup", false), ("task25", false)]);
        list.get(0).unwrap().set_title("fix 2 things");
        assert_eq!(titles(&list), vec!["fix a things", "sell syrup", "taskaa"]);
    }

    #[test]
    fn rewrite_discards_y_to_z_result() {
        let (list, _) = list_with(&[("yes 5", false), ("only y", false)]);
        list.get(1).unwrap().set_title("xyz");
        assert_eq!(titles(&list), vec!["yes a", "xyz"]);
    }

    #[test]
    fn title_without_x_changes_nothing_else() {
        let (list, _) = list_with(&[("a", false), ("task25", false)]);
        list.get(0).unwrap().set_title("b");
        assert_eq!(titles(&list), vec!["b", "task25"]);
    }

    #[test]
    fn creation_does_not_trigger_rewrite() {
        let (list, _) = list_with(&[("task25", false)]);
        list.add_title("box").unwrap();
        assert_eq!(titles(&list), vec!["task25", "box"]);
    }

    #[test]
    fn rewrite_does_not_recurse_through_triggering_titles() {
        let (list, _) = list_with(&[("x5", false), ("x2", false)]);
        list.get(0).unwrap().set_title("x55");
        assert_eq!(titles(&list), vec!["xaa", "xa"]);
    }

    #[test]
    fn item_label() {
        assert_eq!(TodoList::item_label(0), "items");
        assert_eq!(TodoList::item_label(1), "item");
        assert_eq!(TodoList::item_label(2), "items");
    }
}
