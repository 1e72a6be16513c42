//! The caller's copy of a document version

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::table::{Payload, VersionRow};
use crate::time::Instant;

/// One version of a document as held by a caller.
///
/// A fresh document has no identifiers. After a save it describes the new
/// open version: `id` and `document_id` are set, `start` is the save
/// instant, `end` is `MAX_INSTANT`. Keeping the `id` around is what lets the
/// next save detect a concurrent edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Instant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Instant>,
    /// Type-specific fields
    #[serde(flatten)]
    pub payload: Payload,
}

impl Document {
    /// A new, never saved document.
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// A copy of an existing document that knows only its identity, so that
    /// saving it closes whatever version is open (last writer wins).
    pub fn for_document(document_id: u64, payload: Payload) -> Self {
        Self {
            document_id: Some(document_id),
            payload,
            ..Self::default()
        }
    }

    /// Sets a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a payload field in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(name.into(), value.into());
    }

    /// Returns a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// True when this copy describes an open version.
    pub fn is_open(&self) -> bool {
        self.end.map_or(false, |end| end.is_open_end())
    }
}

impl From<VersionRow> for Document {
    fn from(row: VersionRow) -> Self {
        Self {
            id: Some(row.id),
            document_id: Some(row.document_id),
            start: Some(row.start),
            end: Some(row.end),
            payload: row.payload,
        }
    }
}
