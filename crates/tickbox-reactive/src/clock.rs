#![forbid(unsafe_code)]

//! Time sources for the scheduler.
//!
//! Production code reads the wall clock through `web_time::Instant`. Tests
//! use a [`LabClock`], which only moves when told to, so debounce windows and
//! self-clearing notifications can be exercised without sleeping.
//!
//! # Example
//!
//! ```
//! use tickbox_reactive::clock::{Clock, LabClock};
//! use web_time::Duration;
//!
//! let lab = LabClock::new();
//! let clock = Clock::Lab(lab.clone());
//! let start = clock.now();
//! lab.advance(Duration::from_millis(500));
//! assert_eq!(clock.now() - start, Duration::from_millis(500));
//! ```

use std::cell::Cell;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Where the scheduler gets "now" from.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock for testing.
    Lab(LabClock),
}

impl Clock {
    /// Current time according to this source.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(lab) => lab.now(),
        }
    }

    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self, Self::Lab(_))
    }
}

/// A manually-advanceable clock.
///
/// All clones share the same offset, so a test can hand one clone to the
/// runtime and keep another to drive time forward.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Rc<Cell<u64>>,
}

impl LabClock {
    /// Create a new lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Rc::new(Cell::new(0)),
        }
    }

    /// Advance the lab clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.set(self.offset_us.get().saturating_add(us));
    }

    /// Time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.get())
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lab_clock_only_moves_when_advanced() {
        let lab = LabClock::new();
        let t0 = lab.now();
        assert_eq!(lab.now(), t0);
        lab.advance(Duration::from_millis(250));
        assert_eq!(lab.now() - t0, Duration::from_millis(250));
    }

    #[test]
    fn clones_share_time() {
        let a = LabClock::new();
        let b = a.clone();
        a.advance(Duration::from_secs(2));
        assert_eq!(b.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn clock_dispatches_to_source() {
        let lab = LabClock::new();
        let clock = Clock::Lab(lab.clone());
        assert!(clock.is_lab());
        assert!(!Clock::default().is_lab());
        lab.advance(Duration::from_millis(1));
        assert_eq!(clock.now(), lab.now());
    }
}
