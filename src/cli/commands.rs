//! CLI command implementations
//!
//! Every command loads the configuration, applies its `log_level`, opens
//! the catalog and answers with one JSON response. `check` and `repair`
//! also write their diagnostic protocol to stdout (and error lines to
//! stderr) ahead of the response.

use std::io::{self, Write};
use std::path::Path;

use serde_json::{json, Value};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::document::{Document, DocumentError, VersionStore};
use crate::integrity::{
    DiagnosticCounts, Diagnostics, IntervalChecker, IntervalRepair, RepairTool, Verbosity,
};
use crate::observability::Logger;
use crate::table::{RowFilter, RowOrder};
use crate::time::{Clock, Instant, SystemClock};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command).inspect_err(|e| {
        let _ = write_error(e.code_str(), e.message());
    })
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let config = load_config(cmd.config_path())?;

    match cmd {
        Command::Init { .. } => write_response(init(&config)?),
        Command::Check {
            table, verbosity, ..
        } => {
            let stdout = io::stdout();
            let stderr = io::stderr();
            let (data, counts) = check(
                &config,
                table.as_deref(),
                Verbosity::from(verbosity),
                &mut stdout.lock(),
                &mut stderr.lock(),
            )?;
            write_response(data)?;
            if counts.errors > 0 {
                return Err(CliError::check_failed(counts.errors));
            }
            Ok(())
        }
        Command::Repair {
            tool,
            table,
            verbosity,
            ..
        } => {
            let stdout = io::stdout();
            let stderr = io::stderr();
            let data = repair(
                &config,
                tool,
                table.as_deref(),
                Verbosity::from(verbosity),
                &mut stdout.lock(),
                &mut stderr.lock(),
            )?;
            write_response(data)
        }
        Command::Save { table, start, .. } => {
            let request = read_request()?;
            write_response(save(&config, &table, start, request)?)
        }
        Command::Delete {
            table,
            document_id,
            at,
            ..
        } => write_response(delete(&config, &table, document_id, at)?),
        Command::Restore { table, id, at, .. } => {
            write_response(restore(&config, &table, id, at)?)
        }
        Command::History {
            table, document_id, ..
        } => write_response(history(&config, &table, document_id)?),
        Command::At {
            table,
            instant,
            document_id,
            ..
        } => write_response(at(&config, &table, instant, document_id)?),
    }
}

fn load_config(path: &Path) -> CliResult<Config> {
    let config = Config::load(path)?;
    Logger::set_min_severity(config.min_severity()?);
    Ok(config)
}

fn open_catalog(config: &Config) -> CliResult<Catalog> {
    if !Catalog::is_initialized(config.data_path()) {
        return Err(CliError::not_initialized());
    }
    Ok(Catalog::open(config)?)
}

/// Stores to operate on: one named table, or all of them.
fn selected<'c>(
    catalog: &'c Catalog,
    table: Option<&str>,
) -> CliResult<Vec<(&'c str, &'c VersionStore)>> {
    match table {
        Some(name) => {
            let store = catalog.store(name)?;
            Ok(vec![(store.table().name(), store)])
        }
        None => Ok(catalog.stores().collect()),
    }
}

/// Create the data directory and one empty journal per document type.
pub fn init(config: &Config) -> CliResult<Value> {
    if Catalog::is_initialized(config.data_path()) {
        return Err(CliError::already_initialized());
    }
    let catalog = Catalog::create(config)?;
    Ok(json!({
        "initialized": true,
        "tables": catalog.names().collect::<Vec<_>>(),
    }))
}

/// Audit every selected table. Returns the reports and the total counts of
/// diagnostic lines.
pub fn check(
    config: &Config,
    table: Option<&str>,
    verbosity: Verbosity,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> CliResult<(Value, DiagnosticCounts)> {
    let catalog = open_catalog(config)?;
    let now = SystemClock.now();
    let mut diag = Diagnostics::new(out, err, verbosity);

    let mut reports = Vec::new();
    for (_, store) in selected(&catalog, table)? {
        let report = IntervalChecker::new(store.table(), now)
            .with_window(catalog.scan_window())
            .run(&mut diag)?;
        reports.push(report);
    }
    diag.flush()?;

    let counts = diag.counts();
    let data = json!({
        "reports": reports,
        "warnings": counts.warnings,
        "errors": counts.errors,
    });
    Ok((data, counts))
}

/// Apply `tool` to every selected table.
pub fn repair(
    config: &Config,
    tool: RepairTool,
    table: Option<&str>,
    verbosity: Verbosity,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> CliResult<Value> {
    let catalog = open_catalog(config)?;
    let mut diag = Diagnostics::new(out, err, verbosity);

    let mut affected = serde_json::Map::new();
    for (name, store) in selected(&catalog, table)? {
        let rows = IntervalRepair::new(store.table())
            .with_window(catalog.scan_window())
            .run(tool, &mut diag)?;
        affected.insert(name.to_string(), json!(rows));
    }
    diag.flush()?;

    Ok(json!({ "tool": tool.as_str(), "affected": affected }))
}

/// Save the request document as a new version of `table`.
pub fn save(config: &Config, table: &str, start: Option<Instant>, request: Value) -> CliResult<Value> {
    let mut document: Document = serde_json::from_value(request)?;
    if document.id.is_some() && document.document_id.is_none() {
        return Err(CliError::invalid_input(
            "a document with an id must also carry its document_id",
        ));
    }

    let catalog = open_catalog(config)?;
    catalog.store(table)?.save(&mut document, start)?;
    Ok(serde_json::to_value(&document)?)
}

/// Close the open version of `document_id`.
pub fn delete(config: &Config, table: &str, document_id: u64, at: Option<Instant>) -> CliResult<Value> {
    let catalog = open_catalog(config)?;
    let document = Document::for_document(document_id, Default::default());
    let closed = catalog.store(table)?.delete(&document, at)?;
    Ok(json!({ "document_id": document_id, "closed": closed }))
}

/// Reopen the version with row id `id`.
pub fn restore(config: &Config, table: &str, id: u64, at: Option<Instant>) -> CliResult<Value> {
    let catalog = open_catalog(config)?;
    let store = catalog.store(table)?;
    let mut document = store
        .table()
        .select(&RowFilter::all().id(id), RowOrder::Id, Some(1))
        .into_iter()
        .next()
        .map(Document::from)
        .ok_or_else(|| DocumentError::NotFound(format!("{} version {}", table, id)))?;

    let restored = store.restore(&mut document, at)?;
    Ok(json!({ "restored": restored, "document": document }))
}

/// Every version of `document_id`, newest first.
pub fn history(config: &Config, table: &str, document_id: u64) -> CliResult<Value> {
    let catalog = open_catalog(config)?;
    let versions = catalog.store(table)?.history(document_id)?;
    Ok(serde_json::to_value(versions)?)
}

/// Versions valid at `instant` (default: now).
pub fn at(
    config: &Config,
    table: &str,
    instant: Option<Instant>,
    document_id: Option<u64>,
) -> CliResult<Value> {
    let catalog = open_catalog(config)?;
    let instant = instant.unwrap_or_else(|| SystemClock.now());
    let filter = match document_id {
        Some(document_id) => RowFilter::all().document_id(document_id),
        None => RowFilter::all(),
    };

    let versions = match catalog.store(table)?.at(instant, &filter) {
        Ok(versions) => versions,
        Err(DocumentError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(json!({ "instant": instant.to_string(), "versions": versions }))
}
