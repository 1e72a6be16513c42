//! Versioned documents
//!
//! A document is a chain of immutable versions sharing one `document_id`,
//! each valid over `[start, end)`. At most one version per document is open
//! (`end` past `FUTURE`, normally `MAX_INSTANT`); every edit closes it and
//! inserts its successor in one atomic table batch.

mod bulk;
mod errors;
mod model;
mod parts;
mod store;

pub use bulk::IdStrategy;
pub use errors::{DocumentError, DocumentResult};
pub use model::Document;
pub use parts::{DocumentRegistry, PartSpec};
pub use store::VersionStore;
