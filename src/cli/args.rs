//! CLI argument definitions using clap
//!
//! Commands:
//! - chronodoc init --config <path>
//! - chronodoc check [--table <name>] [--verbosity 0|1|2]
//! - chronodoc repair <tool> [--table <name>]
//! - chronodoc save --table <name> [--start <instant>]   (document JSON on stdin)
//! - chronodoc delete --table <name> --document-id <n> [--at <instant>]
//! - chronodoc restore --table <name> --id <n> [--at <instant>]
//! - chronodoc history --table <name> --document-id <n>
//! - chronodoc at --table <name> [--instant <instant>] [--document-id <n>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::integrity::RepairTool;
use crate::time::Instant;

/// chronodoc - append-only, time-versioned documents
#[derive(Parser, Debug)]
#[command(name = "chronodoc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory and an empty journal per document type
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,
    },

    /// Audit version intervals without changing anything
    Check {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        /// Only check this document type
        #[arg(long)]
        table: Option<String>,

        /// 0: errors, 1: warnings, 2: everything
        #[arg(long, default_value_t = 1)]
        verbosity: u8,
    },

    /// Apply one repair tool
    Repair {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        /// normalize-overflow, remove-phantoms, drop-history or fix-overlaps
        tool: RepairTool,

        /// Only repair this document type
        #[arg(long)]
        table: Option<String>,

        #[arg(long, default_value_t = 1)]
        verbosity: u8,
    },

    /// Save the document read from stdin as a new version
    Save {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        #[arg(long)]
        table: String,

        /// Start of the new version (default: now)
        #[arg(long)]
        start: Option<Instant>,
    },

    /// Close the open version of a document
    Delete {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        #[arg(long)]
        table: String,

        #[arg(long)]
        document_id: u64,

        #[arg(long)]
        at: Option<Instant>,
    },

    /// Make an earlier version current again
    Restore {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        #[arg(long)]
        table: String,

        /// Row id of the version to restore
        #[arg(long)]
        id: u64,

        #[arg(long)]
        at: Option<Instant>,
    },

    /// List every version of a document, newest first
    History {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        #[arg(long)]
        table: String,

        #[arg(long)]
        document_id: u64,
    },

    /// List the versions valid at an instant
    At {
        #[arg(long, default_value = "./chronodoc.json")]
        config: PathBuf,

        #[arg(long)]
        table: String,

        /// Default: now
        #[arg(long)]
        instant: Option<Instant>,

        #[arg(long)]
        document_id: Option<u64>,
    },
}

impl Command {
    pub fn config_path(&self) -> &PathBuf {
        match self {
            Command::Init { config }
            | Command::Check { config, .. }
            | Command::Repair { config, .. }
            | Command::Save { config, .. }
            | Command::Delete { config, .. }
            | Command::Restore { config, .. }
            | Command::History { config, .. }
            | Command::At { config, .. } => config,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_tool_parsed() {
        let cli = Cli::try_parse_from(["chronodoc", "repair", "fix-overlaps", "--table", "invoice"])
            .unwrap();
        match cli.command {
            Command::Repair { tool, table, config, .. } => {
                assert_eq!(tool, RepairTool::FixOverlaps);
                assert_eq!(table.as_deref(), Some("invoice"));
                assert_eq!(config, PathBuf::from("./chronodoc.json"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["chronodoc", "repair", "vacuum"]).is_err());
    }

    #[test]
    fn test_instant_arguments_parsed() {
        let cli = Cli::try_parse_from([
            "chronodoc",
            "delete",
            "--table",
            "invoice",
            "--document-id",
            "123",
            "--at",
            "2024-01-01 00:00:00",
        ])
        .unwrap();
        match cli.command {
            Command::Delete { document_id, at, .. } => {
                assert_eq!(document_id, 123);
                assert_eq!(at, Instant::from_ymd_hms(2024, 1, 1, 0, 0, 0));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_defaults() {
        let cli = Cli::try_parse_from(["chronodoc", "check", "--config", "/etc/c.json"]).unwrap();
        assert_eq!(cli.command.config_path(), &PathBuf::from("/etc/c.json"));
        assert!(matches!(cli.command, Command::Check { verbosity: 1, table: None, .. }));
    }
}
