//! TimeContext - the "current instant" of one unit of work
//!
//! A context belongs to exactly one unit of work (a request, a task, a CLI
//! invocation). It is `Send` but not `Sync`: it may move between threads with
//! its unit of work, but is never shared.
//!
//! Reads resolve their instant through `now()`:
//! - a pinned instant, if one is active;
//! - otherwise true wall-clock time, frozen on first use so that every read in
//!   the same unit of work observes the same instant.
//!
//! Writes never consult the context unless the caller passes its instant
//! explicitly; they use `real_now()`.

use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::{Clock, Instant, SystemClock};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Pin {
    instant: Instant,
    /// Set by `pin`/`scoped`, as opposed to frozen by the first read.
    explicit: bool,
}

/// Per-unit-of-work time context.
pub struct TimeContext {
    clock: Arc<dyn Clock>,
    pin: Cell<Option<Pin>>,
}

impl TimeContext {
    /// Creates a context reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a context over an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pin: Cell::new(None),
        }
    }

    /// The instant reads should observe.
    pub fn now(&self) -> Instant {
        match self.pin.get() {
            Some(pin) => pin.instant,
            None => {
                let instant = self.clock.now();
                self.pin.set(Some(Pin {
                    instant,
                    explicit: false,
                }));
                instant
            }
        }
    }

    /// True wall-clock time, ignoring any pin.
    pub fn real_now(&self) -> Instant {
        self.clock.now()
    }

    /// Returns the clock backing this context.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fixes the instant for the remainder of the unit of work.
    pub fn pin(&mut self, instant: Instant) {
        self.pin.set(Some(Pin {
            instant,
            explicit: true,
        }));
    }

    /// Drops any pinned or frozen instant.
    pub fn clear(&mut self) {
        self.pin.set(None);
    }

    /// True while an explicitly pinned instant is active.
    pub fn is_retrospective(&self) -> bool {
        matches!(self.pin.get(), Some(Pin { explicit: true, .. }))
    }

    /// Overrides the current instant until the returned guard is dropped.
    ///
    /// `None` overrides with true wall-clock time. The previous state is
    /// restored on every exit path, including early returns and panics.
    pub fn scoped(&mut self, instant: Option<Instant>) -> TimeScope<'_> {
        let previous = self.pin.get();
        let instant = instant.unwrap_or_else(|| self.clock.now());
        self.pin.set(Some(Pin {
            instant,
            explicit: true,
        }));
        TimeScope {
            ctx: self,
            previous,
        }
    }

    /// Runs `f` with the current instant overridden.
    pub fn with_instant<R>(&mut self, instant: Instant, f: impl FnOnce(&mut TimeContext) -> R) -> R {
        let mut scope = self.scoped(Some(instant));
        f(&mut scope)
    }

    /// Runs `f` with the current instant set to true wall-clock time.
    pub fn with_real_time<R>(&mut self, f: impl FnOnce(&mut TimeContext) -> R) -> R {
        let mut scope = self.scoped(None);
        f(&mut scope)
    }

    /// Brackets one unit of work; the context is cleared when the guard drops.
    ///
    /// Use this when a context is reused by a worker across units of work so
    /// that one unit's pin never leaks into the next.
    pub fn unit_of_work(&mut self) -> UnitOfWork<'_> {
        UnitOfWork { ctx: self }
    }
}

impl Default for TimeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeContext")
            .field("pin", &self.pin.get())
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`TimeContext::scoped`].
pub struct TimeScope<'a> {
    ctx: &'a mut TimeContext,
    previous: Option<Pin>,
}

impl Deref for TimeScope<'_> {
    type Target = TimeContext;

    fn deref(&self) -> &TimeContext {
        self.ctx
    }
}

impl DerefMut for TimeScope<'_> {
    fn deref_mut(&mut self) -> &mut TimeContext {
        self.ctx
    }
}

impl Drop for TimeScope<'_> {
    fn drop(&mut self) {
        self.ctx.pin.set(self.previous);
    }
}

/// Guard returned by [`TimeContext::unit_of_work`].
pub struct UnitOfWork<'a> {
    ctx: &'a mut TimeContext,
}

impl Deref for UnitOfWork<'_> {
    type Target = TimeContext;

    fn deref(&self) -> &TimeContext {
        self.ctx
    }
}

impl DerefMut for UnitOfWork<'_> {
    fn deref_mut(&mut self) -> &mut TimeContext {
        self.ctx
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        self.ctx.clear();
    }
}
