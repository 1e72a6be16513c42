//! # Document Errors

use thiserror::Error;

use crate::table::TableError;

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Version store errors
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The version the caller believed open was closed by another writer.
    /// Reload and retry; the store never retries on its own.
    #[error("Document {document_id} changed concurrently: version {id} is no longer open")]
    Conflict { document_id: u64, id: u64 },

    #[error("Bulk save conflict: expected {expected} open version(s), found {actual}")]
    BatchConflict { expected: usize, actual: usize },

    #[error("No version found: {0}")]
    NotFound(String),

    #[error("{count} versions found where one was expected: {query}")]
    MultipleFound { count: usize, query: String },

    /// A supplied instant precedes the monotonic floor. Programmer error.
    #[error("Ordering violation: {0}")]
    OrderingViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

impl DocumentError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            DocumentError::Conflict { .. } => 409,
            DocumentError::BatchConflict { .. } => 409,
            DocumentError::NotFound(_) => 404,
            DocumentError::MultipleFound { .. } => 409,
            DocumentError::OrderingViolation(_) => 500,
            DocumentError::Configuration(_) => 500,
            DocumentError::InvalidDocument(_) => 400,
            DocumentError::Table(_) => 500,
        }
    }

    /// True for optimistic-concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DocumentError::Conflict { .. } | DocumentError::BatchConflict { .. }
        )
    }
}
