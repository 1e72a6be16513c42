//! CLI-specific error types
//!
//! Every failure ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::integrity::IntegrityError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout)
    IoError,
    /// Already initialized
    AlreadyInitialized,
    /// Not initialized
    NotInitialized,
    /// Malformed request on stdin
    InvalidInput,
    /// Version store refused the operation
    DocumentError,
    /// Journal corruption
    DataCorruption,
    /// Check found errors
    CheckFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CHRONO_CLI_CONFIG_ERROR",
            Self::IoError => "CHRONO_CLI_IO_ERROR",
            Self::AlreadyInitialized => "CHRONO_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "CHRONO_CLI_NOT_INITIALIZED",
            Self::InvalidInput => "CHRONO_CLI_INVALID_INPUT",
            Self::DocumentError => "CHRONO_CLI_DOCUMENT_ERROR",
            Self::DataCorruption => "CHRONO_DATA_CORRUPTION",
            Self::CheckFailed => "CHRONO_CLI_CHECK_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    pub fn already_initialized() -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            "Data directory already initialized",
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            "Data directory not initialized. Run 'chronodoc init' first.",
        )
    }

    pub fn check_failed(errors: usize) -> Self {
        Self::new(
            CliErrorCode::CheckFailed,
            format!("{} interval error(s) found", errors),
        )
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(format!("{}: {}", e.code(), e))
    }
}

impl From<DocumentError> for CliError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Table(ref table) if table.is_fatal() => {
                Self::new(CliErrorCode::DataCorruption, table.to_string())
            }
            DocumentError::Configuration(msg) => Self::config_error(msg),
            other => Self::new(
                CliErrorCode::DocumentError,
                format!("{} ({})", other, other.status_code()),
            ),
        }
    }
}

impl From<IntegrityError> for CliError {
    fn from(e: IntegrityError) -> Self {
        match e {
            IntegrityError::Table(table) => DocumentError::Table(table).into(),
            IntegrityError::Output(io) => io.into(),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
