//! Time subsystem
//!
//! Provides the timeline vocabulary shared by every other module:
//! - `Instant` and the sentinel constants `MAX_INSTANT`, `MIN_INSTANT`, `FUTURE`
//! - `Clock` implementations for true wall-clock time
//! - `TimeContext`, the per-unit-of-work "current instant" used by reads
//!
//! Retrospection (viewing the system as it was at a past instant) is done by
//! pinning an instant on the context of one unit of work.

mod clock;
mod context;
mod instant;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{TimeContext, TimeScope, UnitOfWork};
pub use instant::{Instant, ParseInstantError, FUTURE, MAX_INSTANT, MIN_INSTANT};
