//! Interval integrity checker
//!
//! A read-only audit of one table. Aggregate anomaly counts come first,
//! then a single ordered pass over `(document_id, start, end)` compares every
//! row with its predecessor of the same document. Anomalies are diagnostics,
//! never errors: the audit always runs to the end.

use serde::Serialize;

use super::diagnostics::Diagnostics;
use super::errors::IntegrityResult;
use crate::observability::ObservationScope;
use crate::scan::{CancelToken, ChunkedScanner, TableRange};
use crate::table::{Predicate, RowFilter, Table, VersionRow};
use crate::time::{Instant, FUTURE, MAX_INSTANT};

/// Default rows per scan window.
pub const DEFAULT_SCAN_WINDOW: usize = 100_000;

/// Counts found by one check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub table: String,
    /// Rows visited by the ordered pass
    pub rows: usize,
    /// `start` after now
    pub future_start: usize,
    /// `end` in `(now, FUTURE]`
    pub ending_soon: usize,
    /// `end` past `MAX_INSTANT`
    pub overflow: usize,
    /// `end < start`
    pub reversed: usize,
    /// `end == start`
    pub phantoms: usize,
    /// Overlaps ending before `FUTURE`
    pub past_overlaps: usize,
    /// Earliest start and latest end among past overlaps
    pub past_overlap_span: Option<(Instant, Instant)>,
    /// Overlaps reaching `FUTURE`: two versions valid now or later
    pub active_conflicts: usize,
    /// Earliest start among active conflicts
    pub active_since: Option<Instant>,
    /// Gaps between consecutive versions
    pub holes: usize,
    /// True when the ordered pass was cancelled
    pub cancelled: bool,
}

impl CheckReport {
    /// True when no anomaly of any class was found.
    pub fn is_clean(&self) -> bool {
        self.future_start == 0
            && self.ending_soon == 0
            && self.overflow == 0
            && self.reversed == 0
            && self.phantoms == 0
            && self.past_overlaps == 0
            && self.active_conflicts == 0
            && self.holes == 0
    }
}

/// Checks the intervals of one table.
pub struct IntervalChecker<'t> {
    table: &'t Table,
    now: Instant,
    window: usize,
    cancel: CancelToken,
}

impl<'t> IntervalChecker<'t> {
    /// A checker judging "future" relative to `now` (true wall-clock time).
    pub fn new(table: &'t Table, now: Instant) -> Self {
        Self {
            table,
            now,
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

    /// Runs the full audit.
    pub fn run(&self, diag: &mut Diagnostics<'_>) -> IntegrityResult<CheckReport> {
        let name = self.table.name();
        let scope = ObservationScope::with_fields("CHECK", &[("table", name)]);
        match self.audit(diag) {
            Ok(report) => {
                scope.complete_with_fields(&[
                    ("active_conflicts", &report.active_conflicts.to_string()),
                    ("clean", if report.is_clean() { "true" } else { "false" }),
                    ("rows", &report.rows.to_string()),
                ]);
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn audit(&self, diag: &mut Diagnostics<'_>) -> IntegrityResult<CheckReport> {
        let name = self.table.name();
        let mut report = CheckReport {
            table: name.to_string(),
            ..CheckReport::default()
        };
        diag.info(&format!("checking table {}", name))?;

        report.future_start = self.count(RowFilter::all().and(Predicate::StartGt(self.now)));
        if report.future_start > 0 {
            diag.warning(&format!("{}: {} version(s) start in the future", name, report.future_start))?;
        } else {
            diag.info(&format!("{}: no versions start in the future", name))?;
        }

        report.ending_soon = self.count(
            RowFilter::all()
                .and(Predicate::EndGt(self.now))
                .and(Predicate::EndLte(FUTURE)),
        );
        if report.ending_soon > 0 {
            diag.warning(&format!("{}: {} version(s) end in the future", name, report.ending_soon))?;
        } else {
            diag.info(&format!("{}: no versions end in the future", name))?;
        }

        report.overflow = self.count(RowFilter::all().and(Predicate::EndGt(MAX_INSTANT)));
        if report.overflow > 0 {
            diag.warning(&format!("{}: {} version(s) end after {}", name, report.overflow, MAX_INSTANT))?;
        } else {
            diag.info(&format!("{}: no versions end after {}", name, MAX_INSTANT))?;
        }

        report.reversed = self.count(RowFilter::all().and(Predicate::Reversed));
        if report.reversed > 0 {
            let source = TableRange::filtered(self.table, RowFilter::all().and(Predicate::Reversed));
            ChunkedScanner::new(&source, self.window)
                .with_cancel(self.cancel.clone())
                .with_label(name)
                .try_for_each(|row| {
                    diag.error(&format!(
                        "{}: document_id {}, id {}: start after end",
                        name, row.document_id, row.id
                    ))
                })?;
            diag.error(&format!("{}: {} reversed version(s) in total (start > end)", name, report.reversed))?;
        } else {
            diag.info(&format!("{}: no reversed versions (start > end)", name))?;
        }

        report.phantoms = self.count(RowFilter::all().and(Predicate::ZeroLength));
        if report.phantoms > 0 {
            diag.warning(&format!("{}: {} phantom version(s) (start = end)", name, report.phantoms))?;
        } else {
            diag.info(&format!("{}: no phantom versions (start = end)", name))?;
        }

        self.ordered_pass(diag, &mut report)?;
        Ok(report)
    }

    fn count(&self, filter: RowFilter) -> usize {
        self.table.count(&filter)
    }

    fn ordered_pass(&self, diag: &mut Diagnostics<'_>, report: &mut CheckReport) -> IntegrityResult<()> {
        let name = self.table.name();
        let source = TableRange::new(self.table);
        let scanner = ChunkedScanner::new(&source, self.window)
            .with_cancel(self.cancel.clone())
            .with_label(name);

        let mut previous: Option<VersionRow> = None;
        let summary = scanner.try_for_each(|row| -> IntegrityResult<()> {
            if let Some(prev) = previous.as_ref().filter(|p| p.document_id == row.document_id) {
                if row.start < prev.end {
                    let overlap_end = prev.end.min(row.end);
                    if overlap_end >= FUTURE {
                        diag.warning(&format!(
                            "{}: document_id {}, id {} overlapped by {} since {}",
                            name, row.document_id, prev.id, row.id, row.start
                        ))?;
                        report.active_conflicts += 1;
                        report.active_since = Some(
                            report.active_since.map_or(row.start, |since| since.min(row.start)),
                        );
                    } else if overlap_end != row.start {
                        diag.info(&format!(
                            "{}: document_id {}, id {} overlapped by {} over ({}, {})",
                            name, row.document_id, prev.id, row.id, row.start, overlap_end
                        ))?;
                        report.past_overlaps += 1;
                        report.past_overlap_span = Some(match report.past_overlap_span {
                            Some((lo, hi)) => (lo.min(row.start), hi.max(overlap_end)),
                            None => (row.start, overlap_end),
                        });
                    }
                } else if row.start > prev.end {
                    diag.info(&format!(
                        "{}: document_id {}, hole between ids {} and {}",
                        name, row.document_id, prev.id, row.id
                    ))?;
                    report.holes += 1;
                }
            }
            previous = Some(row);
            Ok(())
        })?;
        report.rows = summary.rows;
        report.cancelled = summary.cancelled;

        match report.past_overlap_span {
            Some((lo, hi)) if report.past_overlaps > 0 => diag.warning(&format!(
                "{}: {} overlap(s) in the past, between {} and {}",
                name, report.past_overlaps, lo, hi
            ))?,
            _ => diag.info(&format!("{}: no overlaps in the past", name))?,
        }
        match report.active_since {
            Some(since) if report.active_conflicts > 0 => diag.error(&format!(
                "{}: {} active overlap(s) since {}",
                name, report.active_conflicts, since
            ))?,
            _ => diag.info(&format!("{}: no active overlaps", name))?,
        }
        if report.holes > 0 {
            diag.warning(&format!("{}: {} hole(s)", name, report.holes))?;
        } else {
            diag.info(&format!("{}: no holes", name))?;
        }
        if report.cancelled {
            diag.warning(&format!("{}: check cancelled after {} row(s)", name, report.rows))?;
        }
        Ok(())
    }
}
