//! Table error types
//!
//! Error codes:
//! - CHRONO_TABLE_IO_ERROR (ERROR severity)
//! - CHRONO_TABLE_WRITE_FAILED (ERROR severity)
//! - CHRONO_TABLE_READ_FAILED (ERROR severity)
//! - CHRONO_TABLE_CONSTRAINT_VIOLATION (ERROR severity)
//! - CHRONO_TABLE_GUARD_FAILED (ERROR severity)
//! - CHRONO_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for table errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
    /// The table must not be used further
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Table-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableErrorCode {
    /// Disk I/O failure
    ChronoTableIoError,
    /// Journal append or fsync failed
    ChronoTableWriteFailed,
    /// Journal read failed
    ChronoTableReadFailed,
    /// A write would break a table constraint (duplicate id)
    ChronoTableConstraintViolation,
    /// A guarded update affected an unexpected number of rows
    ChronoTableGuardFailed,
    /// Journal checksum or framing failure
    ChronoDataCorruption,
}

impl TableErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            TableErrorCode::ChronoTableIoError => "CHRONO_TABLE_IO_ERROR",
            TableErrorCode::ChronoTableWriteFailed => "CHRONO_TABLE_WRITE_FAILED",
            TableErrorCode::ChronoTableReadFailed => "CHRONO_TABLE_READ_FAILED",
            TableErrorCode::ChronoTableConstraintViolation => "CHRONO_TABLE_CONSTRAINT_VIOLATION",
            TableErrorCode::ChronoTableGuardFailed => "CHRONO_TABLE_GUARD_FAILED",
            TableErrorCode::ChronoDataCorruption => "CHRONO_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            TableErrorCode::ChronoDataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for TableErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Details of a failed guard, kept so callers can map it to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardFailure {
    /// Position of the failing operation within its batch
    pub op_index: usize,
    /// Rows the operation was required to affect
    pub expected: usize,
    /// Rows it actually matched
    pub actual: usize,
}

/// Table error type with full context
#[derive(Debug)]
pub struct TableError {
    code: TableErrorCode,
    message: String,
    details: Option<String>,
    guard: Option<GuardFailure>,
    source: Option<io::Error>,
}

impl TableError {
    fn new(code: TableErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            guard: None,
            source: None,
        }
    }

    /// Create a new table I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TableErrorCode::ChronoTableIoError, message)
        }
    }

    /// Create a journal write failure
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TableErrorCode::ChronoTableWriteFailed, message)
        }
    }

    /// Create the error returned by a journal that could not undo a failed append
    pub fn journal_poisoned(message: impl Into<String>) -> Self {
        Self::new(TableErrorCode::ChronoTableWriteFailed, message)
    }

    /// Create a journal read failure
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TableErrorCode::ChronoTableReadFailed, message)
        }
    }

    /// Create a constraint violation
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::new(TableErrorCode::ChronoTableConstraintViolation, message)
    }

    /// Create a guard failure for the operation at `op_index`
    pub fn guard_failed(op_index: usize, expected: usize, actual: usize) -> Self {
        Self {
            details: Some(format!(
                "op: {}, expected: {}, actual: {}",
                op_index, expected, actual
            )),
            guard: Some(GuardFailure {
                op_index,
                expected,
                actual,
            }),
            ..Self::new(
                TableErrorCode::ChronoTableGuardFailed,
                "guarded update affected an unexpected number of rows",
            )
        }
    }

    /// Create a data corruption error at a journal offset (FATAL)
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            details: Some(format!("byte_offset: {}", offset)),
            ..Self::new(TableErrorCode::ChronoDataCorruption, reason)
        }
    }

    /// Returns the error code
    pub fn code(&self) -> TableErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns the guard failure, if this error is one
    pub fn guard(&self) -> Option<GuardFailure> {
        self.guard
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;
