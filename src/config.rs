//! Configuration file
//!
//! A single JSON object, validated as soon as it is loaded:
//!
//! ```json
//! {
//!   "data_dir": "./data",
//!   "scan_window": 100000,
//!   "id_strategy": "sequence",
//!   "documents": ["invoice", "customer"],
//!   "parts": [{ "name": "invoice_line", "references": { "invoice_id": "invoice" } }],
//!   "log_level": "warn"
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{IdStrategy, PartSpec};
use crate::integrity::DEFAULT_SCAN_WINDOW;
use crate::observability::Severity;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "CHRONO_CONFIG_READ_FAILED",
            ConfigError::Parse(_) => "CHRONO_CONFIG_PARSE_FAILED",
            ConfigError::Invalid(_) => "CHRONO_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one journal per document type (required)
    pub data_dir: String,

    /// Rows per window for checks and repairs
    #[serde(default = "default_scan_window")]
    pub scan_window: usize,

    #[serde(default)]
    pub id_strategy: IdStrategy,

    /// Registered document types
    pub documents: Vec<String>,

    #[serde(default)]
    pub parts: Vec<PartSpec>,

    /// Minimum severity of structured log lines
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_scan_window() -> usize {
    DEFAULT_SCAN_WINDOW
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }

        if self.scan_window == 0 {
            return Err(ConfigError::Invalid("scan_window must be > 0".into()));
        }

        if self.documents.is_empty() {
            return Err(ConfigError::Invalid(
                "documents must list at least one document type".into(),
            ));
        }

        let mut seen = HashSet::new();
        for name in self.documents.iter().chain(self.parts.iter().map(|p| &p.name)) {
            if !is_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "'{}' is not a valid type name (letters, digits and '_' only)",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "type '{}' is declared more than once",
                    name
                )));
            }
        }

        self.min_severity()?;
        Ok(())
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    /// Parsed `log_level`
    pub fn min_severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "Invalid log_level: '{}'. Must be one of trace, info, warn, error, fatal.",
                self.log_level
            ))
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
