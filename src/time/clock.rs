//! Wall-clock sources
//!
//! Writes are always stamped with true wall-clock time. The clock is a trait
//! object so that tests (and replay tooling) can drive time explicitly.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use super::Instant;

/// A source of true wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The system clock (UTC).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::from_datetime(Utc::now())
    }
}

/// A manually driven clock.
///
/// Every call to `now()` returns the stored instant; `tick()` advances it.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            micros: AtomicI64::new(start.as_micros()),
        }
    }

    /// Sets the current instant.
    pub fn set(&self, instant: Instant) {
        self.micros.store(instant.as_micros(), Ordering::SeqCst);
    }

    /// Advances the clock by `micros` and returns the new instant.
    pub fn tick(&self, micros: i64) -> Instant {
        let updated = self.micros.fetch_add(micros, Ordering::SeqCst) + micros;
        Instant::from_micros(updated)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.load(Ordering::SeqCst))
    }
}
