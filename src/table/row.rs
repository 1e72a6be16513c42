//! Row types
//!
//! A table holds one row per document version. The fixed columns are
//! `id`, `document_id`, `start` and `end`; everything type-specific lives in
//! the JSON payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{Instant, FUTURE};

/// Type-specific payload columns of a version.
pub type Payload = Map<String, Value>;

/// One stored version row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow {
    /// Unique per version, assigned at insert
    pub id: u64,
    /// Logical document identity shared by all versions
    pub document_id: u64,
    /// Inclusive start of validity
    pub start: Instant,
    /// Exclusive end of validity
    pub end: Instant,
    /// Type-specific columns
    #[serde(default)]
    pub payload: Payload,
}

impl VersionRow {
    /// True when this row has no scheduled end.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.end > FUTURE
    }

    /// True when the row is valid at `instant` (`start <= instant < end`).
    #[inline]
    pub fn contains(&self, instant: Instant) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True for zero-length or reversed rows.
    #[inline]
    pub fn is_phantom(&self) -> bool {
        self.start >= self.end
    }

    /// Returns a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// A row to insert. Missing identifiers are assigned by the table:
/// `id` from the native sequence, `document_id` from the new `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub id: Option<u64>,
    pub document_id: Option<u64>,
    pub start: Instant,
    pub end: Instant,
    pub payload: Payload,
}

impl NewVersion {
    /// A row whose identifiers are all assigned by the table.
    pub fn new(start: Instant, end: Instant, payload: Payload) -> Self {
        Self {
            id: None,
            document_id: None,
            start,
            end,
            payload,
        }
    }

    /// Sets the document identity.
    pub fn with_document_id(mut self, document_id: Option<u64>) -> Self {
        self.document_id = document_id;
        self
    }

    /// Sets an explicit row id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}
