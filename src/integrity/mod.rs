//! Interval integrity
//!
//! [`IntervalChecker`] audits a table for interval anomalies without
//! changing it; [`IntervalRepair`] corrects them one anomaly class at a time.
//! Both stream the table through the chunked scanner and write their
//! findings to [`Diagnostics`].

mod checker;
mod diagnostics;
mod errors;
mod repair;

pub use checker::{CheckReport, IntervalChecker, DEFAULT_SCAN_WINDOW};
pub use diagnostics::{DiagnosticCounts, Diagnostics, Verbosity};
pub use errors::{IntegrityError, IntegrityResult};
pub use repair::{IntervalRepair, RepairTool};
