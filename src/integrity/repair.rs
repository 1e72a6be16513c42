//! Interval repair tools
//!
//! Each tool corrects one anomaly class and reports how many rows it
//! changed. Every corrective step is its own table batch and every tool is
//! idempotent, so an interrupted repair is resumed by running it again.

use std::fmt;
use std::str::FromStr;

use super::checker::DEFAULT_SCAN_WINDOW;
use super::diagnostics::Diagnostics;
use super::errors::IntegrityResult;
use crate::observability::ObservationScope;
use crate::scan::{CancelToken, ChunkedScanner, TableRange};
use crate::table::{Predicate, RowFilter, Table, VersionRow, WriteBatch};
use crate::time::{FUTURE, MAX_INSTANT, MIN_INSTANT};

/// The available repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTool {
    /// Clamp ends past `FUTURE` (other than the sentinel) to `MAX_INSTANT`
    NormalizeOverflow,
    /// Delete rows with `start >= end`
    RemovePhantoms,
    /// Delete closed rows and move every remaining start to `MIN_INSTANT`
    DropHistory,
    /// Resolve overlapping consecutive versions
    FixOverlaps,
}

impl RepairTool {
    pub const ALL: [RepairTool; 4] = [
        RepairTool::NormalizeOverflow,
        RepairTool::RemovePhantoms,
        RepairTool::DropHistory,
        RepairTool::FixOverlaps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairTool::NormalizeOverflow => "normalize-overflow",
            RepairTool::RemovePhantoms => "remove-phantoms",
            RepairTool::DropHistory => "drop-history",
            RepairTool::FixOverlaps => "fix-overlaps",
        }
    }
}

impl fmt::Display for RepairTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RepairTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepairTool::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| format!("unknown repair tool '{}'", s))
    }
}

/// Repairs the intervals of one table.
pub struct IntervalRepair<'t> {
    table: &'t Table,
    window: usize,
    cancel: CancelToken,
}

impl<'t> IntervalRepair<'t> {
    pub fn new(table: &'t Table) -> Self {
        Self {
            table,
            window: DEFAULT_SCAN_WINDOW,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs one tool, returning the number of rows changed.
    pub fn run(&self, tool: RepairTool, diag: &mut Diagnostics<'_>) -> IntegrityResult<usize> {
        let scope = ObservationScope::with_fields(
            "REPAIR",
            &[("table", self.table.name()), ("tool", tool.as_str())],
        );
        diag.info(&format!("{}: running {}", self.table.name(), tool))?;
        let result = match tool {
            RepairTool::NormalizeOverflow => self.normalize_overflow(diag),
            RepairTool::RemovePhantoms => self.remove_phantoms(diag),
            RepairTool::DropHistory => self.drop_history(diag),
            RepairTool::FixOverlaps => self.fix_overlaps(diag),
        };
        match result {
            Ok(changed) => {
                scope.complete_with_fields(&[("changed", &changed.to_string())]);
                Ok(changed)
            }
            Err(e) => {
                if e.is_fatal() {
                    scope.fail_fatal(&e.to_string());
                } else {
                    scope.fail(&e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Sets `end := MAX_INSTANT` on every row ending past `FUTURE` other
    /// than the sentinel itself.
    pub fn normalize_overflow(&self, diag: &mut Diagnostics<'_>) -> IntegrityResult<usize> {
        let name = self.table.name();
        let filter = RowFilter::all()
            .and(Predicate::EndGt(FUTURE))
            .and(Predicate::EndNe(MAX_INSTANT));
        let changed = self
            .table
            .apply(WriteBatch::new().update_end(filter, MAX_INSTANT))?
            .total_affected();
        if changed > 0 {
            diag.warning(&format!("{}: {} end(s) past {} set to {}", name, changed, FUTURE, MAX_INSTANT))?;
        } else {
            diag.info(&format!("{}: no ends past {} other than {}", name, FUTURE, MAX_INSTANT))?;
        }
        Ok(changed)
    }

    /// Deletes every row with `start >= end`.
    pub fn remove_phantoms(&self, diag: &mut Diagnostics<'_>) -> IntegrityResult<usize> {
        let name = self.table.name();
        let removed = self
            .table
            .apply(WriteBatch::new().delete(RowFilter::all().and(Predicate::Phantom)))?
            .total_affected();
        if removed > 0 {
            diag.warning(&format!("{}: {} phantom version(s) removed", name, removed))?;
        } else {
            diag.info(&format!("{}: no phantom versions", name))?;
        }
        Ok(removed)
    }

    /// Deletes every closed row and moves the start of every remaining row
    /// to `MIN_INSTANT`, in one batch. Returns the number of rows removed.
    pub fn drop_history(&self, diag: &mut Diagnostics<'_>) -> IntegrityResult<usize> {
        let name = self.table.name();
        diag.info(&format!("{}: {} row(s) before compaction", name, self.table.len()))?;
        let outcome = self.table.apply(
            WriteBatch::new()
                .delete(RowFilter::all().closed())
                .update_start(RowFilter::all().and(Predicate::StartNe(MIN_INSTANT)), MIN_INSTANT),
        )?;
        let removed = outcome.affected.first().copied().unwrap_or(0);
        if removed > 0 {
            diag.warning(&format!("{}: {} closed version(s) removed", name, removed))?;
        } else {
            diag.info(&format!("{}: no closed versions", name))?;
        }
        Ok(removed)
    }

    /// Walks each document's versions in `(start, end)` order and resolves
    /// every overlap between consecutive versions. With ends past `FUTURE`
    /// read as `MAX_INSTANT`:
    ///
    /// - a later version ending before the earlier one is deleted;
    /// - otherwise, a later version starting after the earlier one truncates
    ///   the earlier one to its start;
    /// - otherwise (same start) the earlier version is deleted.
    pub fn fix_overlaps(&self, diag: &mut Diagnostics<'_>) -> IntegrityResult<usize> {
        let name = self.table.name();
        let source = TableRange::new(self.table);
        let scanner = ChunkedScanner::new(&source, self.window)
            .with_cancel(self.cancel.clone())
            .with_label(name);

        let mut changed = 0;
        let mut previous: Option<VersionRow> = None;
        let summary = scanner.try_for_each(|mut row| -> IntegrityResult<()> {
            if let Some(prev) = previous
                .as_mut()
                .filter(|p| p.document_id == row.document_id && row.start < p.end)
            {
                row.end = row.end.clamp_open();
                prev.end = prev.end.clamp_open();

                if row.end < prev.end {
                    self.table.apply(WriteBatch::new().delete(RowFilter::all().id(row.id)))?;
                    diag.warning(&format!(
                        "{}: document_id {}, id {}: overlapped later version removed",
                        name, row.document_id, row.id
                    ))?;
                    changed += 1;
                    return Ok(());
                }
                if row.start > prev.start {
                    self.table
                        .apply(WriteBatch::new().update_end(RowFilter::all().id(prev.id), row.start))?;
                    diag.warning(&format!(
                        "{}: document_id {}, id {}: overlapped earlier version truncated",
                        name, row.document_id, prev.id
                    ))?;
                } else {
                    self.table.apply(WriteBatch::new().delete(RowFilter::all().id(prev.id)))?;
                    diag.warning(&format!(
                        "{}: document_id {}, id {}: superseded version removed",
                        name, row.document_id, prev.id
                    ))?;
                }
                changed += 1;
            }
            previous = Some(row);
            Ok(())
        })?;

        if summary.cancelled {
            diag.warning(&format!("{}: overlap repair cancelled after {} row(s)", name, summary.rows))?;
        }
        if changed == 0 {
            diag.info(&format!("{}: no overlapping versions", name))?;
        }
        Ok(changed)
    }
}
