//! Table store
//!
//! Each document type is stored in one table of version rows with an `id`
//! primary key and a `document_id` secondary index. Writes go through
//! atomic [`WriteBatch`]es whose updates may be guarded by an expected
//! affected-row count. Durable tables journal every committed batch to an
//! append-only, checksummed file and replay it on open.

mod batch;
mod errors;
mod filter;
mod handle;
mod journal;
mod row;
mod state;

pub use batch::{BatchOp, BatchOutcome, WriteBatch};
pub use errors::{GuardFailure, Severity, TableError, TableErrorCode, TableResult};
pub use filter::{Predicate, RowFilter, RowOrder};
pub use handle::Table;
pub use journal::{JournalEntry, JournalReader, JournalWriter};
pub use row::{NewVersion, Payload, VersionRow};
pub use state::Mutation;
