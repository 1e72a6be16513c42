//! Version store properties
//!
//! End-to-end behavior of save, delete, restore and point-in-time reads
//! against a real journaled table:
//! - at most one version of a document is valid at any instant
//! - history lists versions newest first
//! - a stale save never silently overwrites a concurrent one
//! - deleted documents stay visible in the past only

use std::sync::{Arc, Barrier};
use std::thread;

use chronodoc::document::{Document, DocumentError, VersionStore};
use chronodoc::table::{NewVersion, Payload, RowFilter, Table, WriteBatch};
use chronodoc::time::{Instant, ManualClock, TimeContext, MAX_INSTANT};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn ts(s: &str) -> Instant {
    s.parse().expect("valid instant literal")
}

fn data(value: i64) -> Document {
    Document::new(Payload::new()).with_field("data", value)
}

fn open_store(dir: &TempDir) -> VersionStore {
    let table = Table::open(dir.path(), "docs").expect("open table");
    VersionStore::new(Arc::new(table)).with_clock(Arc::new(ManualClock::new(ts("2024-01-01 00:00:00"))))
}

fn payload_at(store: &VersionStore, instant: Instant, document_id: u64) -> i64 {
    store
        .get_or_fail(instant, &RowFilter::all().document_id(document_id))
        .expect("a version is valid")
        .field("data")
        .and_then(|v| v.as_i64())
        .expect("data field")
}

// =============================================================================
// Save and history
// =============================================================================

#[test]
fn test_two_saves_build_history_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let t1 = ts("2024-01-01 10:00:00");
    let t2 = ts("2024-01-02 10:00:00");

    let mut doc = data(1);
    store.save(&mut doc, Some(t1)).unwrap();
    let document_id = doc.document_id.unwrap();
    doc.set("data", 2);
    store.save(&mut doc, Some(t2)).unwrap();

    let history = store.history(document_id).unwrap();
    let values: Vec<_> = history.iter().map(|d| d.field("data").cloned()).collect();
    assert_eq!(values, vec![Some(2.into()), Some(1.into())]);
    assert_eq!(history[1].end, Some(t2));
    assert_eq!(history[0].end, Some(MAX_INSTANT));

    assert_eq!(payload_at(&store, t1, document_id), 1);
    assert_eq!(payload_at(&store, t2, document_id), 2);
}

#[test]
fn test_point_in_time_uniqueness_over_many_saves() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let base = ts("2024-01-01 00:00:00");
    let mut doc = data(0);
    store.save(&mut doc, Some(base)).unwrap();
    for i in 1..50 {
        doc.set("data", i);
        store.save(&mut doc, Some(base.plus_micros(i * 1_000))).unwrap();
    }
    let document_id = doc.document_id.unwrap();

    for offset in (0..50_000).step_by(250) {
        let instant = base.plus_micros(offset);
        let valid = store.at(instant, &RowFilter::all().document_id(document_id)).unwrap();
        assert_eq!(valid.len(), 1, "exactly one version at {}", instant);
        assert_eq!(payload_at(&store, instant, document_id), offset / 1_000);
    }
}

#[test]
fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let document_id = {
        let store = open_store(&dir);
        let mut doc = data(1);
        store.save(&mut doc, Some(ts("2024-01-01 00:00:00"))).unwrap();
        doc.set("data", 2);
        store.save(&mut doc, Some(ts("2024-01-05 00:00:00"))).unwrap();
        doc.document_id.unwrap()
    };

    let reopened = open_store(&dir);
    assert_eq!(reopened.history(document_id).unwrap().len(), 2);
    assert_eq!(payload_at(&reopened, ts("2024-01-03 00:00:00"), document_id), 1);
}

// =============================================================================
// Optimistic concurrency
// =============================================================================

#[test]
fn test_concurrent_saves_from_same_version_one_wins() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(&dir));

    let mut original = data(0);
    store.save(&mut original, Some(ts("2024-01-01 00:00:00"))).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (1..=2)
        .map(|writer| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let mut copy = original.clone();
            thread::spawn(move || {
                copy.set("data", writer);
                barrier.wait();
                store.save(&mut copy, Some(ts("2024-01-02 00:00:00")))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(DocumentError::Conflict { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);

    let document_id = original.document_id.unwrap();
    assert_eq!(store.history(document_id).unwrap().len(), 2);
    assert_eq!(
        store
            .table()
            .count(&RowFilter::all().document_id(document_id).open()),
        1
    );
}

#[test]
fn test_save_with_stale_copy_after_delete_conflicts() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut doc = data(1);
    store.save(&mut doc, Some(ts("2024-01-01 00:00:00"))).unwrap();
    store.delete(&doc, Some(ts("2024-01-02 00:00:00"))).unwrap();

    let err = store.save(&mut doc, Some(ts("2024-01-03 00:00:00"))).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.status_code(), 409);
}

// =============================================================================
// Delete and restore
// =============================================================================

#[test]
fn test_delete_hides_document_from_then_on() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut doc = data(7);
    store.save(&mut doc, Some(ts("2024-01-01 00:00:00"))).unwrap();
    let document_id = doc.document_id.unwrap();

    let td = ts("2024-02-01 00:00:00");
    assert_eq!(store.delete(&doc, Some(td)).unwrap(), 1);

    let filter = RowFilter::all().document_id(document_id);
    assert_eq!(payload_at(&store, td.plus_micros(-1), document_id), 7);
    assert!(matches!(store.at(td, &filter), Err(DocumentError::NotFound(_))));
    assert!(matches!(
        store.at(td.plus_micros(86_400_000_000), &filter),
        Err(DocumentError::NotFound(_))
    ));
    assert_eq!(store.delete(&doc, Some(td.plus_micros(1))).unwrap(), 0);
}

#[test]
fn test_restore_reopens_earlier_payload() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut doc = data(1);
    store.save(&mut doc, Some(ts("2024-01-01 00:00:00"))).unwrap();
    let mut v1 = doc.clone();
    doc.set("data", 2);
    store.save(&mut doc, Some(ts("2024-01-02 00:00:00"))).unwrap();
    let document_id = doc.document_id.unwrap();

    // v1 as stored now: closed at the second save
    v1.end = Some(ts("2024-01-02 00:00:00"));
    let t3 = ts("2024-01-03 00:00:00");
    assert!(store.restore(&mut v1, Some(t3)).unwrap());

    assert_eq!(payload_at(&store, t3, document_id), 1);
    assert_eq!(store.history(document_id).unwrap().len(), 3);
    assert_eq!(v1.start, Some(t3));
    assert_eq!(v1.end, Some(MAX_INSTANT));
}

#[test]
fn test_restore_before_latest_start_is_ordering_violation() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut doc = data(1);
    store.save(&mut doc, Some(ts("2024-01-01 00:00:00"))).unwrap();
    let mut v1 = doc.clone();
    store.save(&mut doc, Some(ts("2024-01-05 00:00:00"))).unwrap();
    v1.end = Some(ts("2024-01-05 00:00:00"));

    let err = store.restore(&mut v1, Some(ts("2024-01-04 00:00:00"))).unwrap_err();
    assert!(matches!(err, DocumentError::OrderingViolation(_)));
}

// =============================================================================
// Retrospection through the time context
// =============================================================================

#[test]
fn test_pinned_context_reads_the_past() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut doc = data(1);
    store.save(&mut doc, Some(ts("2024-01-01 00:00:00"))).unwrap();
    doc.set("data", 2);
    store.save(&mut doc, Some(ts("2024-06-01 00:00:00"))).unwrap();

    let mut ctx = TimeContext::with_clock(Arc::new(ManualClock::new(ts("2024-07-01 00:00:00"))));
    let filter = RowFilter::all().document_id(doc.document_id.unwrap());
    let past = ctx.with_instant(ts("2024-03-01 00:00:00"), |ctx| store.current(ctx, &filter).unwrap());
    assert_eq!(past[0].field("data"), Some(&1.into()));
    assert_eq!(store.current(&ctx, &filter).unwrap()[0].field("data"), Some(&2.into()));
}

// =============================================================================
// Worked example
// =============================================================================

#[test]
fn test_document_123_example() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let t0 = ts("2024-01-01 00:00:00");
    let t1 = ts("2024-01-10 00:00:00");
    let delta = 1_000_000;

    store
        .table()
        .apply(WriteBatch::new().insert_all(vec![
            NewVersion::new(t0, t1, data(1).payload)
                .with_document_id(Some(123))
                .with_id(500),
            NewVersion::new(t1, MAX_INSTANT, data(2).payload)
                .with_document_id(Some(123))
                .with_id(501),
        ]))
        .unwrap();

    assert_eq!(payload_at(&store, t0.plus_micros(delta), 123), 1);
    assert_eq!(payload_at(&store, t1.plus_micros(delta), 123), 2);
    let history: Vec<_> = store
        .history(123)
        .unwrap()
        .into_iter()
        .map(|d| d.field("data").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(history, vec![Some(2), Some(1)]);
}
