//! # Integrity Errors

use std::io;

use thiserror::Error;

use crate::table::TableError;

/// Result type for checks and repairs
pub type IntegrityResult<T> = Result<T, IntegrityError>;

/// Failures of the underlying store or of the diagnostics output. Data
/// anomalies are never errors; they are reported as diagnostics.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Diagnostics output failed: {0}")]
    Output(#[from] io::Error),
}

impl IntegrityError {
    /// True when the table reported corruption.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IntegrityError::Table(e) if e.is_fatal())
    }
}
