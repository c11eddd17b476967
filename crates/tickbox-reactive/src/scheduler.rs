#![forbid(unsafe_code)]

//! Single-threaded timer queue.
//!
//! The host event loop owns time: it calls [`Scheduler::run_due`] whenever it
//! wakes up (or after advancing a [`LabClock`](crate::clock::LabClock) in
//! tests). Nothing here spawns threads or sleeps.
//!
//! # Invariants
//!
//! 1. Timers fire in deadline order; ties fire in creation order.
//! 2. A cancelled timer never fires.
//! 3. No internal borrow is held while a task runs, so tasks may schedule or
//!    cancel other timers.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use web_time::{Duration, Instant};

use crate::clock::Clock;

/// Upper bound on tasks fired by a single [`Scheduler::fire_all`] call.
const DRAIN_LIMIT: usize = 10_000;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

type Task = Box<dyn FnOnce()>;

struct SchedulerInner {
    clock: Clock,
    next_id: u64,
    queue: BTreeMap<(Instant, u64), Task>,
    deadlines: AHashMap<u64, Instant>,
}

/// Cheaply cloneable handle to a shared timer queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("clock", &inner.clock)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Clock::Real)
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                clock,
                next_id: 1,
                queue: BTreeMap::new(),
                deadlines: AHashMap::new(),
            })),
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.inner.borrow().clock.clone()
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.borrow().clock.now()
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let deadline = inner.clock.now() + delay;
        inner.queue.insert((deadline, id), Box::new(task));
        inner.deadlines.insert(id, deadline);
        TimerId(id)
    }

    /// Cancel a pending timer. Returns `false` if it already fired or was
    /// cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let task = {
            let mut inner = self.inner.borrow_mut();
            let Some(deadline) = inner.deadlines.remove(&id.0) else {
                return false;
            };
            inner.queue.remove(&(deadline, id.0))
        };
        // Dropped outside the borrow: the closure may own cells.
        task.is_some()
    }

    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.borrow().deadlines.contains_key(&id.0)
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .borrow()
            .queue
            .first_key_value()
            .map(|((deadline, _), _)| *deadline)
    }

    /// Fire every timer whose deadline has passed. Returns how many fired.
    pub fn run_due(&self) -> usize {
        let mut fired = 0;
        while let Some(task) = self.pop_next(true) {
            task();
            fired += 1;
        }
        if fired > 0 {
            tracing::trace!(fired, "scheduler.run_due");
        }
        fired
    }

    /// Fire every pending timer regardless of its deadline.
    pub fn fire_all(&self) -> usize {
        let mut fired = 0;
        while let Some(task) = self.pop_next(false) {
            task();
            fired += 1;
            if fired >= DRAIN_LIMIT {
                tracing::warn!(fired, "scheduler.fire_all stopped at drain limit");
                break;
            }
        }
        fired
    }

    fn pop_next(&self, only_due: bool) -> Option<Task> {
        let mut inner = self.inner.borrow_mut();
        let &(deadline, id) = inner.queue.first_key_value()?.0;
        if only_due && deadline > inner.clock.now() {
            return None;
        }
        inner.deadlines.remove(&id);
        inner.queue.remove(&(deadline, id))
    }
}
