#![forbid(unsafe_code)]

//! Reactive cells for tickbox.
//!
//! This crate provides change-tracking primitives for a single-threaded,
//! event-driven state engine:
//!
//! - [`Observable`]: a mutable value that notifies subscribers on write,
//!   with a per-cell [`NotifyPolicy`].
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`Computed`]: a memoized value whose dependencies are whatever cells it
//!   read during its last evaluation. Lazy, eager, throttled and writable
//!   variants.
//! - [`Runtime`]: the arena-backed dependency graph every cell registers in,
//!   plus the [`Scheduler`] that drives throttled evaluation.
//!
//! # Architecture
//!
//! Cells never point at each other. The runtime stores nodes in an arena and
//! edges as [`NodeId`] lists, rebuilt on every evaluation, so there are no
//! ownership cycles between cells and no stale edges after a computed cell
//! stops reading something.
//!
//! # Invariants
//!
//! 1. Within one synchronous mutation every downstream computed cell is
//!    marked dirty before control returns to the caller.
//! 2. Subscribers are notified in registration order.
//! 3. A circular dependency between computed cells is detected and reported,
//!    never looped on.

pub mod clock;
pub mod computed;
pub mod error;
pub mod observable;
pub mod runtime;
pub mod scheduler;

pub use clock::{Clock, LabClock};
pub use computed::Computed;
pub use error::{ReactiveError, Result};
pub use observable::{NotifyPolicy, Observable, Subscription};
pub use runtime::{Evaluation, NodeId, NodeKind, Runtime};
pub use scheduler::{Scheduler, TimerId};
