//! Chunked range scanning
//!
//! Reads an ordered, indexed collection in windows of bounded size. Window
//! boundaries are planned up front from row counts (see [`ScanPlan`]); rows
//! are then fetched one window at a time, so memory use is bounded by the
//! window size rather than the collection size.

mod plan;
mod scanner;
mod source;
mod table_range;

pub use plan::{Boundary, ScanPlan};
pub use scanner::{CancelToken, ChunkedScanner, ScanSummary, Windows};
pub use source::{Midpoint, RangeSource};
pub use table_range::TableRange;
