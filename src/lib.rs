//! chronodoc - append-only, time-versioned documents
//!
//! Every document is stored as a chain of immutable versions, each valid
//! over a half-open interval `[start, end)`. Saving closes the open version
//! and appends a new one; deleting closes without appending; reads pick the
//! versions valid at one instant.
//!
//! Modules, bottom-up:
//! - `time`: instants, clocks and the per-unit-of-work time context
//! - `table`: journaled version tables with atomic, guarded write batches
//! - `scan`: window planning and chunked range scans
//! - `document`: the version store, bulk writes and the parts registry
//! - `integrity`: interval checks and repairs
//! - `config`, `catalog`, `cli`: the command-line surface
//! - `observability`: structured logging

pub mod catalog;
pub mod cli;
pub mod config;
pub mod document;
pub mod integrity;
pub mod observability;
pub mod scan;
pub mod table;
pub mod time;
