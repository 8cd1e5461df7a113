//! Wall-clock sources.
//!
//! Classification never reads a global clock: the pipeline asks its injected
//! [`Clock`] for `now` and passes it down explicitly.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp, seconds.
    fn now(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and replay.
///
/// ```
/// use ghostbus::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(121);
/// assert_eq!(clock.now(), 1_121);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
