//! CLI module for chronodoc
//!
//! Provides command-line interface for:
//! - init: Create the data directory and journals
//! - check / repair: Interval integrity tooling
//! - save / delete / restore: Version writes
//! - history / at: Version reads

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{at, check, delete, history, init, repair, restore, run, run_command, save};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_error, write_response};
