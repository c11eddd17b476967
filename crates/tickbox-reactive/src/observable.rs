#![forbid(unsafe_code)]

//! Mutable single-value cells with subscriber notification.
//!
//! # Design
//!
//! [`Observable<T>`] keeps its value and subscriber list in shared storage
//! (`Rc`), and registers a source node in the [`Runtime`] graph. Reading the
//! value inside a computed evaluation records the read; writing it marks all
//! downstream computed cells dirty and then runs subscribers.
//!
//! Subscribers are stored as `Weak` callbacks. The strong reference lives in
//! the [`Subscription`] guard returned by [`Observable::subscribe`], so
//! dropping the guard unsubscribes. Dead entries are pruned lazily during
//! notification.
//!
//! # Notify policy
//!
//! By default every `set` notifies, even when the new value equals the old
//! one. Cells whose consumers only care about real changes opt in to
//! [`NotifyPolicy::WhenChanged`] through [`Observable::distinct`].
//!
//! # Invariants
//!
//! 1. Version increments exactly once per notifying write.
//! 2. Subscribers are notified in registration order.
//! 3. Downstream computed cells are dirty before the first subscriber runs.
//! 4. No internal borrow is held while a subscriber runs.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::runtime::{NodeId, NodeKind, Runtime};

/// Whether a write that does not change the value still notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyPolicy {
    /// Every write notifies.
    #[default]
    Always,
    /// Writes equal to the current value are dropped.
    WhenChanged,
}

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    node: NodeId,
    rt: Runtime,
    value: RefCell<T>,
    version: Cell<u64>,
    policy: NotifyPolicy,
    equal: Option<fn(&T, &T) -> bool>,
    subscribers: RefCell<Vec<Weak<Callback<T>>>>,
}

impl<T> Drop for ObservableInner<T> {
    fn drop(&mut self) {
        self.rt.release(self.node);
    }
}

/// A reactive value.
///
/// Cloning an `Observable` creates a new handle to the **same** cell.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("node", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

/// RAII guard for a subscriber callback.
///
/// The callback stays registered exactly as long as this guard is alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _callback: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl<T: 'static> Observable<T> {
    /// A cell that notifies on every write.
    pub fn new(rt: &Runtime, value: T) -> Self {
        Self::build(rt, value, NotifyPolicy::Always, None)
    }

    /// A cell that ignores writes equal to its current value.
    pub fn distinct(rt: &Runtime, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::build(
            rt,
            value,
            NotifyPolicy::WhenChanged,
            Some(<T as PartialEq>::eq as fn(&T, &T) -> bool),
        )
    }

    fn build(
        rt: &Runtime,
        value: T,
        policy: NotifyPolicy,
        equal: Option<fn(&T, &T) -> bool>,
    ) -> Self {
        let node = rt.register("observable", NodeKind::Source);
        Self {
            inner: Rc::new(ObservableInner {
                node,
                rt: rt.clone(),
                value: RefCell::new(value),
                version: Cell::new(0),
                policy,
                equal,
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Name the cell for diagnostics (cycle paths, traces).
    #[must_use]
    pub fn labeled(self, label: impl Into<String>) -> Self {
        self.inner.rt.set_label(self.inner.node, label);
        self
    }

    /// Read the value by reference, recording the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.rt.track(self.inner.node);
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify.
    ///
    /// Under [`NotifyPolicy::WhenChanged`] a write equal to the current value
    /// is a no-op.
    pub fn set(&self, value: T)
    where
        T: Clone,
    {
        if let Some(equal) = self.inner.equal
            && equal(&self.inner.value.borrow(), &value)
        {
            return;
        }
        let previous = self.inner.value.replace(value);
        self.changed();
        drop(previous);
        self.inner.rt.flush();
    }

    /// Mutate the value in place and notify unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: Clone,
    {
        f(&mut self.inner.value.borrow_mut());
        self.changed();
        self.inner.rt.flush();
    }

    fn changed(&self)
    where
        T: Clone,
    {
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.rt.notify_changed(self.inner.node);
        self.notify_subscribers();
    }

    fn notify_subscribers(&self)
    where
        T: Clone,
    {
        let callbacks: Vec<Rc<Callback<T>>> = {
            let mut subs = self.inner.subscribers.borrow_mut();
            subs.retain(|weak| weak.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };
        if callbacks.is_empty() {
            return;
        }
        let value = self.inner.value.borrow().clone();
        self.inner.rt.untracked(|| {
            for callback in &callbacks {
                callback(&value);
            }
        });
    }

    /// Register a callback run after every notifying write.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .subscribers
            .borrow_mut()
            .push(Rc::downgrade(&strong));
        Subscription {
            _callback: Box::new(strong),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use]
    pub fn notify_policy(&self) -> NotifyPolicy {
        self.inner.policy
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.inner.rt
    }

    /// Whether two handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Read the value, recording the read.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read the value without recording a dependency.
    #[must_use]
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }
}
