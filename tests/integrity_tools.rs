//! Interval checker and repair tools against journaled tables
//!
//! A table seeded with one instance of every anomaly class is audited,
//! repaired tool by tool, and audited again; the repairs must survive a
//! reopen. Overlap repair is exercised on randomized data for idempotence.

use chronodoc::integrity::{
    CheckReport, DiagnosticCounts, Diagnostics, IntervalChecker, IntervalRepair, RepairTool,
    Verbosity,
};
use chronodoc::table::{NewVersion, Payload, RowFilter, RowOrder, Table, VersionRow, WriteBatch};
use chronodoc::time::{Instant, MAX_INSTANT, MIN_INSTANT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const NOW: Instant = Instant::from_micros(1_000_000);

fn t(micros: i64) -> Instant {
    Instant::from_micros(micros)
}

fn row(document_id: u64, start: i64, end: Instant) -> NewVersion {
    NewVersion::new(t(start), end, Payload::new()).with_document_id(Some(document_id))
}

/// One anomaly of each class:
/// - document 1: overlap in the past
/// - document 2: overflowing end, active conflict
/// - document 3: phantom
/// - document 4: reversed interval
fn seed(table: &Table) {
    table
        .apply(WriteBatch::new().insert_all(vec![
            row(1, 0, t(10)),
            row(1, 5, t(20)),
            row(1, 20, MAX_INSTANT),
            row(2, 0, MAX_INSTANT.plus_micros(5)),
            row(2, 10, MAX_INSTANT),
            row(3, 1, MAX_INSTANT),
            row(3, 7, t(7)),
            row(4, 9, t(3)),
        ]))
        .unwrap();
}

fn check(table: &Table, window: usize) -> (CheckReport, DiagnosticCounts) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut diag = Diagnostics::new(&mut out, &mut err, Verbosity::Info);
    let report = IntervalChecker::new(table, NOW)
        .with_window(window)
        .run(&mut diag)
        .unwrap();
    (report, diag.counts())
}

fn repair(table: &Table, tool: RepairTool, window: usize) -> usize {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut diag = Diagnostics::new(&mut out, &mut err, Verbosity::Errors);
    IntervalRepair::new(table)
        .with_window(window)
        .run(tool, &mut diag)
        .unwrap()
}

fn snapshot(table: &Table) -> Vec<VersionRow> {
    table.select(&RowFilter::all(), RowOrder::Id, None)
}

// =============================================================================
// Checker
// =============================================================================

#[test]
fn test_seeded_anomalies_are_all_reported() {
    let table = Table::in_memory("docs");
    seed(&table);

    for window in [1, 2, 3, 100] {
        let (report, counts) = check(&table, window);
        assert_eq!(report.rows, 8, "window {}", window);
        assert_eq!(report.overflow, 1);
        assert_eq!(report.reversed, 1);
        assert_eq!(report.phantoms, 1);
        assert_eq!(report.past_overlaps, 1);
        assert_eq!(report.past_overlap_span, Some((t(5), t(10))));
        assert_eq!(report.active_conflicts, 1);
        assert_eq!(report.active_since, Some(t(10)));
        assert_eq!(report.holes, 0);
        // reversed row, reversed total, active overlaps
        assert_eq!(counts.errors, 3);
        assert!(!report.is_clean());
    }
}

#[test]
fn test_clean_data_yields_no_warnings_or_errors() {
    let table = Table::in_memory("docs");
    let mut rows = Vec::new();
    for document_id in 1..=20u64 {
        let base = document_id as i64 * 1_000;
        rows.push(row(document_id, base, t(base + 100)));
        rows.push(row(document_id, base + 100, t(base + 250)));
        rows.push(row(document_id, base + 250, MAX_INSTANT));
    }
    table.apply(WriteBatch::new().insert_all(rows)).unwrap();

    for window in [1, 7, 60, 1_000] {
        let (report, counts) = check(&table, window);
        assert!(report.is_clean());
        assert_eq!(report.rows, 60);
        assert_eq!(counts.warnings, 0);
        assert_eq!(counts.errors, 0);
    }
}

// =============================================================================
// Repairs
// =============================================================================

#[test]
fn test_repairs_clear_every_class_and_persist() {
    let dir = TempDir::new().unwrap();
    {
        let table = Table::open(dir.path(), "docs").unwrap();
        seed(&table);

        assert_eq!(repair(&table, RepairTool::NormalizeOverflow, 2), 1);
        assert_eq!(repair(&table, RepairTool::RemovePhantoms, 2), 2);
        assert_eq!(repair(&table, RepairTool::FixOverlaps, 2), 2);

        let (report, counts) = check(&table, 2);
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(counts.errors, 0);
    }

    let reopened = Table::open(dir.path(), "docs").unwrap();
    let (report, _) = check(&reopened, 100);
    assert!(report.is_clean());
    assert_eq!(report.rows, 6);

    let doc1: Vec<_> = reopened
        .select(&RowFilter::all().document_id(1), RowOrder::DocumentStartEnd, None)
        .into_iter()
        .map(|r| (r.start, r.end))
        .collect();
    assert_eq!(doc1, vec![(t(0), t(5)), (t(5), t(20)), (t(20), MAX_INSTANT)]);

    let doc2: Vec<_> = reopened
        .select(&RowFilter::all().document_id(2), RowOrder::DocumentStartEnd, None)
        .into_iter()
        .map(|r| (r.start, r.end))
        .collect();
    assert_eq!(doc2, vec![(t(0), t(10)), (t(10), MAX_INSTANT)]);
}

#[test]
fn test_drop_history_keeps_only_open_versions() {
    let dir = TempDir::new().unwrap();
    let table = Table::open(dir.path(), "docs").unwrap();
    table
        .apply(WriteBatch::new().insert_all(vec![
            row(1, 0, t(10)),
            row(1, 10, MAX_INSTANT),
            row(2, 3, t(8)),
        ]))
        .unwrap();

    assert_eq!(repair(&table, RepairTool::DropHistory, 10), 2);
    drop(table);

    let reopened = Table::open(dir.path(), "docs").unwrap();
    let rows = snapshot(&reopened);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].document_id, 1);
    assert_eq!((rows[0].start, rows[0].end), (MIN_INSTANT, MAX_INSTANT));
}

#[test]
fn test_fix_overlaps_is_idempotent_on_random_data() {
    let mut rng = StdRng::seed_from_u64(0x0c4e_d0c5);

    for round in 0..20 {
        let table = Table::in_memory("docs");
        let mut rows = Vec::new();
        for document_id in 1..=rng.gen_range(1..15u64) {
            for _ in 0..rng.gen_range(1..8) {
                let start = rng.gen_range(0..200i64);
                let end = if rng.gen_bool(0.2) {
                    MAX_INSTANT
                } else {
                    t(start + rng.gen_range(1..80))
                };
                rows.push(row(document_id, start, end));
            }
        }
        table.apply(WriteBatch::new().insert_all(rows)).unwrap();
        let window = rng.gen_range(1..30);

        repair(&table, RepairTool::FixOverlaps, window);
        let once = snapshot(&table);
        let (report, _) = check(&table, window);
        assert_eq!(report.past_overlaps, 0, "round {}", round);
        assert_eq!(report.active_conflicts, 0, "round {}", round);

        assert_eq!(repair(&table, RepairTool::FixOverlaps, window), 0, "round {}", round);
        assert_eq!(snapshot(&table), once, "round {}", round);
    }
}
