#![forbid(unsafe_code)]

//! Derived values with automatic dependency tracking.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage, and owns a derived node in the [`Runtime`]
//! graph. Evaluation opens a tracking frame: whatever cells the compute
//! function reads become the node's dependency set, replacing the set from
//! the previous evaluation. When any dependency changes the node is marked
//! dirty; what happens next depends on its [`Evaluation`] mode:
//!
//! - `Lazy`: recompute on the next [`get()`](Computed::get).
//! - `Eager`: recompute before the mutating call returns.
//! - `Throttled(window)`: recompute once no invalidation has arrived for
//!   `window` (trailing edge debounce, driven by the runtime scheduler).
//!
//! A writable computed carries a setter. [`write`](Computed::write) only runs
//! the setter; the cached value is refreshed through the normal dependency
//! path once the setter mutates the underlying cells.
//!
//! # Invariants
//!
//! 1. `get()` never returns a value older than the last settled write to any
//!    of its current dependencies.
//! 2. The compute function runs at most once per invalidation.
//! 3. Version increments by exactly 1 per recomputation.
//!
//! # Failure Modes
//!
//! - **Cycle**: reading a computed cell from inside its own evaluation
//!   (directly or through other computed cells) is a configuration error. It
//!   is logged with the full path and the read panics.
//! - **Compute function panics**: the frame is closed, the cached value from
//!   the last successful evaluation is kept and the node stays dirty, so the
//!   next read retries.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::Duration;

use crate::error::ReactiveError;
use crate::runtime::{Evaluation, NodeId, NodeKind, Refresh, Runtime};

type Setter<T> = Box<dyn Fn(T)>;

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    node: NodeId,
    rt: Runtime,
    compute: Box<dyn Fn() -> T>,
    write: Option<Setter<T>>,
    cached: RefCell<Option<T>>,
    version: Cell<u64>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.rt.release(self.node);
    }
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn evaluate(&self) -> T {
        let frame = match self.rt.begin_evaluation(self.node) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(node = %self.node, error = %err, "computed cycle detected");
                panic!("{err}");
            }
        };
        let value = (self.compute)();
        frame.commit();
        self.version.set(self.version.get() + 1);
        tracing::trace!(node = %self.node, version = self.version.get(), "computed.evaluate");
        let previous = self.cached.replace(Some(value.clone()));
        drop(previous);
        value
    }

    fn current(&self) -> T {
        if !self.rt.is_dirty(self.node)
            && let Some(value) = self.cached.borrow().as_ref()
        {
            return value.clone();
        }
        self.evaluate()
    }
}

impl<T: Clone + 'static> Refresh for ComputedInner<T> {
    fn refresh(&self) {
        if self.rt.is_dirty(self.node) {
            self.evaluate();
        }
    }
}

/// A memoized value derived from whatever cells its compute function reads.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("node", &self.inner.node)
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.rt.is_dirty(self.inner.node))
            .field("version", &self.inner.version.get())
            .field("writable", &self.inner.write.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// A lazily evaluated computed cell.
    pub fn new(rt: &Runtime, compute: impl Fn() -> T + 'static) -> Self {
        Self::build(rt, Evaluation::Lazy, Box::new(compute), None)
    }

    /// A read/write computed cell. `write` must mutate the cells `read`
    /// depends on.
    pub fn writable(
        rt: &Runtime,
        read: impl Fn() -> T + 'static,
        write: impl Fn(T) + 'static,
    ) -> Self {
        Self::build(rt, Evaluation::Lazy, Box::new(read), Some(Box::new(write)))
    }

    /// A computed cell evaluated now and again after every settled change.
    pub fn eager(rt: &Runtime, compute: impl Fn() -> T + 'static) -> Self {
        let computed = Self::build(rt, Evaluation::Eager, Box::new(compute), None);
        computed.inner.evaluate();
        computed
    }

    /// A computed cell evaluated now, then at most once per quiet `window`.
    ///
    /// Every invalidation re-arms the window; the evaluation happens on the
    /// trailing edge when the runtime scheduler fires.
    pub fn throttled(rt: &Runtime, window: Duration, compute: impl Fn() -> T + 'static) -> Self {
        let computed = Self::build(rt, Evaluation::Throttled(window), Box::new(compute), None);
        computed.inner.evaluate();
        computed
    }

    fn build(
        rt: &Runtime,
        mode: Evaluation,
        compute: Box<dyn Fn() -> T>,
        write: Option<Setter<T>>,
    ) -> Self {
        let node = rt.register("computed", NodeKind::Derived(mode));
        let inner = Rc::new(ComputedInner {
            node,
            rt: rt.clone(),
            compute,
            write,
            cached: RefCell::new(None),
            version: Cell::new(0),
        });
        if mode != Evaluation::Lazy {
            let weak: Weak<ComputedInner<T>> = Rc::downgrade(&inner);
            let weak: Weak<dyn Refresh> = weak;
            rt.set_refresh(node, weak);
        }
        Self { inner }
    }

    /// Name the cell for diagnostics (cycle paths, traces).
    #[must_use]
    pub fn labeled(self, label: impl Into<String>) -> Self {
        self.inner.rt.set_label(self.inner.node, label);
        self
    }

    /// Get the current value, recomputing if any dependency has changed.
    ///
    /// # Panics
    ///
    /// Panics if this cell is part of a dependency cycle.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.rt.track(self.inner.node);
        self.inner.current()
    }

    /// Access the current value by reference without cloning the cache.
    ///
    /// # Panics
    ///
    /// Panics if this cell is part of a dependency cycle, or if the closure
    /// re-enters this cell's evaluation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.rt.track(self.inner.node);
        if self.inner.rt.is_dirty(self.inner.node) || self.inner.cached.borrow().is_none() {
            let value = self.inner.evaluate();
            return f(&value);
        }
        let cached = self.inner.cached.borrow();
        match cached.as_ref() {
            Some(value) => f(value),
            None => {
                drop(cached);
                f(&self.inner.evaluate())
            }
        }
    }

    /// Run the custom setter of a writable cell.
    ///
    /// The setter runs inside a batch, so eager dependents observe the final
    /// state once instead of every intermediate write.
    pub fn write(&self, value: T) -> Result<(), ReactiveError> {
        let Some(setter) = self.inner.write.as_ref() else {
            return Err(ReactiveError::ReadOnly {
                label: self
                    .inner
                    .rt
                    .label(self.inner.node)
                    .unwrap_or_else(|| self.inner.node.to_string()),
            });
        };
        self.inner.rt.batch(|| setter(value));
        Ok(())
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.inner.write.is_some()
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.rt.is_dirty(self.inner.node)
    }

    /// Mark this cell (and everything downstream) dirty.
    pub fn invalidate(&self) {
        self.inner.rt.invalidate(self.inner.node);
    }

    /// Evaluate a dirty cell immediately and disarm its debounce timer.
    ///
    /// Returns `true` if an evaluation ran.
    pub fn flush(&self) -> bool {
        self.inner.rt.cancel_timer(self.inner.node);
        if self.is_dirty() {
            self.inner.evaluate();
            true
        } else {
            false
        }
    }

    /// Whether a throttled evaluation is waiting for its window to close.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.inner.rt.has_pending_timer(self.inner.node)
    }

    /// The cells read during the last evaluation, in first-read order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.inner.rt.dependencies(self.inner.node)
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.node
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
