//! Version store
//!
//! Every edit of a document closes its open version and inserts a new one in
//! a single table batch. Lost updates are detected with a guarded close: the
//! version the caller last saw must still be open, or the batch fails as a
//! whole and the caller gets `Conflict`.

use std::sync::Arc;

use super::bulk::IdStrategy;
use super::errors::{DocumentError, DocumentResult};
use super::model::Document;
use crate::observability::{log_event_with_fields, warn_event, Event};
use crate::table::{NewVersion, Predicate, RowFilter, RowOrder, Table, TableError, WriteBatch};
use crate::time::{Clock, Instant, SystemClock, TimeContext, MAX_INSTANT};

/// Save, delete, restore and query the versions of one document type.
pub struct VersionStore {
    table: Arc<Table>,
    clock: Arc<dyn Clock>,
    ids: IdStrategy,
}

impl VersionStore {
    /// A store over `table` stamping writes with the system clock.
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            clock: Arc::new(SystemClock),
            ids: IdStrategy::default(),
        }
    }

    /// Replaces the wall clock used for default write instants.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how bulk saves allocate ids.
    pub fn with_id_strategy(mut self, ids: IdStrategy) -> Self {
        self.ids = ids;
        self
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.ids
    }

    /// True wall-clock time.
    pub fn real_now(&self) -> Instant {
        self.clock.now()
    }

    /// Saves `document` as a new version starting at `start` (default: now).
    ///
    /// On success `document` describes the new open version.
    pub fn save(&self, document: &mut Document, start: Option<Instant>) -> DocumentResult<()> {
        if let (Some(previous), Some(start)) = (document.start, start) {
            if start < previous {
                return Err(DocumentError::OrderingViolation(format!(
                    "start {} precedes the previous start {}",
                    start, previous
                )));
            }
        }
        let start = start.unwrap_or_else(|| self.real_now());

        let mut batch = WriteBatch::new();
        match (document.document_id, document.id) {
            (Some(document_id), Some(id)) => {
                let filter = RowFilter::all().id(id).document_id(document_id).open();
                batch = batch.update_end_expecting(filter, start, 1);
            }
            (Some(document_id), None) => {
                batch = batch.update_end(RowFilter::all().document_id(document_id).open(), start);
            }
            (None, _) => {}
        }
        batch = batch.insert(
            NewVersion::new(start, MAX_INSTANT, document.payload.clone())
                .with_document_id(document.document_id),
        );

        let outcome = self.table.apply(batch).map_err(|e| self.conflict(document, e))?;
        let id = outcome.inserted.first().copied().ok_or_else(|| {
            DocumentError::Table(TableError::constraint_violation("insert returned no id"))
        })?;

        document.id = Some(id);
        document.document_id = Some(document.document_id.unwrap_or(id));
        document.start = Some(start);
        document.end = Some(MAX_INSTANT);

        log_event_with_fields(
            Event::VersionSaved,
            &[
                ("document_id", &document.document_id.unwrap_or(id).to_string()),
                ("id", &id.to_string()),
                ("table", self.table.name()),
            ],
        );
        Ok(())
    }

    /// Saves at the context's current instant.
    pub fn save_now(&self, ctx: &TimeContext, document: &mut Document) -> DocumentResult<()> {
        self.save(document, Some(ctx.now()))
    }

    fn conflict(&self, document: &Document, error: TableError) -> DocumentError {
        match (error.guard(), document.document_id, document.id) {
            (Some(_), Some(document_id), Some(id)) => {
                warn_event(
                    Event::VersionConflict,
                    &[
                        ("document_id", &document_id.to_string()),
                        ("id", &id.to_string()),
                        ("table", self.table.name()),
                    ],
                );
                DocumentError::Conflict { document_id, id }
            }
            _ => DocumentError::Table(error),
        }
    }

    /// Closes the open version at `at` (default: now). Returns the number of
    /// versions closed; zero when the document is already closed.
    pub fn delete(&self, document: &Document, at: Option<Instant>) -> DocumentResult<usize> {
        let document_id = match document.document_id {
            Some(document_id) => document_id,
            None => return Ok(0),
        };
        let at = at.unwrap_or_else(|| self.real_now());
        let outcome = self.table.apply(
            WriteBatch::new().update_end(RowFilter::all().document_id(document_id).open(), at),
        )?;
        let closed = outcome.total_affected();
        if closed > 0 {
            log_event_with_fields(
                Event::DocumentDeleted,
                &[
                    ("document_id", &document_id.to_string()),
                    ("at", &at.to_string()),
                    ("table", self.table.name()),
                ],
            );
        }
        Ok(closed)
    }

    /// Deletes at the context's current instant.
    pub fn delete_now(&self, ctx: &TimeContext, document: &Document) -> DocumentResult<usize> {
        self.delete(document, Some(ctx.now()))
    }

    /// Makes the version described by `document` current again by inserting
    /// a copy of it starting at `at` (default: now).
    ///
    /// Returns `false` without writing when the version is already open.
    /// On success `document` describes the new open version.
    pub fn restore(&self, document: &mut Document, at: Option<Instant>) -> DocumentResult<bool> {
        let document_id = document.document_id.ok_or_else(|| {
            DocumentError::InvalidDocument("restore requires a saved document".into())
        })?;
        if document.is_open() || self.is_stored_open(document) {
            return Ok(false);
        }

        if let Some(at) = at {
            let last = self.table.select(
                &RowFilter::all().document_id(document_id),
                RowOrder::EndDesc,
                Some(1),
            );
            if let Some(last) = last.first() {
                if at <= last.start {
                    return Err(DocumentError::OrderingViolation(format!(
                        "restore at {} does not follow the latest start {}",
                        at, last.start
                    )));
                }
            }
        }
        let at = at.unwrap_or_else(|| self.real_now());

        let batch = WriteBatch::new()
            .update_end(RowFilter::all().document_id(document_id).open(), at)
            .insert(
                NewVersion::new(at, MAX_INSTANT, document.payload.clone())
                    .with_document_id(Some(document_id)),
            );
        let outcome = self.table.apply(batch)?;

        document.id = outcome.inserted.first().copied();
        document.start = Some(at);
        document.end = Some(MAX_INSTANT);
        log_event_with_fields(
            Event::DocumentRestored,
            &[
                ("document_id", &document_id.to_string()),
                ("at", &at.to_string()),
                ("table", self.table.name()),
            ],
        );
        Ok(true)
    }

    /// Restores at the context's current instant.
    pub fn restore_now(&self, ctx: &TimeContext, document: &mut Document) -> DocumentResult<bool> {
        self.restore(document, Some(ctx.now()))
    }

    fn is_stored_open(&self, document: &Document) -> bool {
        match document.id {
            Some(id) => self.table.count(&RowFilter::all().id(id).open()) == 1,
            None => false,
        }
    }

    /// Versions valid at `instant` and matching `filter`, ordered by
    /// `document_id`. `NotFound` when there are none.
    pub fn at(&self, instant: Instant, filter: &RowFilter) -> DocumentResult<Vec<Document>> {
        let rows = self.table.select(
            &RowFilter::all().valid_at(instant).merge(filter),
            RowOrder::DocumentId,
            None,
        );
        if rows.is_empty() {
            return Err(DocumentError::NotFound(format!(
                "{} at {}",
                self.table.name(),
                instant
            )));
        }
        Ok(rows.into_iter().map(Document::from).collect())
    }

    /// Versions valid at the context's current instant.
    pub fn current(&self, ctx: &TimeContext, filter: &RowFilter) -> DocumentResult<Vec<Document>> {
        self.at(ctx.now(), filter)
    }

    /// The single version valid at `instant` and matching `filter`, if any.
    pub fn get(&self, instant: Instant, filter: &RowFilter) -> DocumentResult<Option<Document>> {
        let mut rows = self.table.select(
            &RowFilter::all().valid_at(instant).merge(filter),
            RowOrder::DocumentId,
            Some(2),
        );
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop().map(Document::from)),
            _ => Err(DocumentError::MultipleFound {
                count: self
                    .table
                    .count(&RowFilter::all().valid_at(instant).merge(filter)),
                query: format!("{} at {}", self.table.name(), instant),
            }),
        }
    }

    /// Like [`get`](Self::get), with a miss reported as `NotFound`.
    pub fn get_or_fail(&self, instant: Instant, filter: &RowFilter) -> DocumentResult<Document> {
        self.get(instant, filter)?.ok_or_else(|| {
            DocumentError::NotFound(format!("{} at {}", self.table.name(), instant))
        })
    }

    /// Every version of a document, most recent start first, without
    /// phantom rows.
    pub fn history(&self, document_id: u64) -> DocumentResult<Vec<Document>> {
        let rows = self.table.select(
            &RowFilter::all()
                .document_id(document_id)
                .and(Predicate::Proper),
            RowOrder::StartDesc,
            None,
        );
        Ok(rows.into_iter().map(Document::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Payload;
    use crate::time::ManualClock;
    use serde_json::json;

    fn t(micros: i64) -> Instant {
        Instant::from_micros(micros)
    }

    fn store() -> (VersionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t(1_000)));
        let store = VersionStore::new(Arc::new(Table::in_memory("docs"))).with_clock(clock.clone());
        (store, clock)
    }

    fn doc(data: i64) -> Document {
        Document::new(Payload::new()).with_field("data", data)
    }

    #[test]
    fn test_first_save_assigns_document_id_from_id() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, None).unwrap();
        assert_eq!(d.id, Some(1));
        assert_eq!(d.document_id, Some(1));
        assert_eq!(d.start, Some(t(1_000)));
        assert_eq!(d.end, Some(MAX_INSTANT));
    }

    #[test]
    fn test_save_closes_previous_version() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        d.set("data", 2);
        store.save(&mut d, Some(t(20))).unwrap();

        let history = store.history(1).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].field("data"), Some(&json!(2)));
        assert_eq!(history[1].end, Some(t(20)));
    }

    #[test]
    fn test_stale_copy_conflicts() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        let mut stale = d.clone();
        store.save(&mut d, Some(t(20))).unwrap();

        let err = store.save(&mut stale, Some(t(30))).unwrap_err();
        assert!(matches!(err, DocumentError::Conflict { document_id: 1, id: 1 }));
        assert_eq!(err.status_code(), 409);
        assert_eq!(store.history(1).unwrap().len(), 2);
    }

    #[test]
    fn test_identity_only_copy_is_last_writer_wins() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        let mut other = Document::for_document(1, doc(5).payload);
        store.save(&mut other, Some(t(20))).unwrap();
        assert_eq!(store.get_or_fail(t(25), &RowFilter::all().document_id(1)).unwrap().field("data"), Some(&json!(5)));
    }

    #[test]
    fn test_earlier_start_is_ordering_violation() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        let err = store.save(&mut d, Some(t(5))).unwrap_err();
        assert!(matches!(err, DocumentError::OrderingViolation(_)));
        // Equal start is allowed.
        store.save(&mut d, Some(t(10))).unwrap();
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        assert_eq!(store.delete(&d, Some(t(20))).unwrap(), 1);
        assert_eq!(store.delete(&d, Some(t(30))).unwrap(), 0);
        assert_eq!(store.delete(&doc(3), None).unwrap(), 0);
    }

    #[test]
    fn test_restore_of_open_version_is_noop() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        assert!(!store.restore(&mut d, Some(t(20))).unwrap());
        assert_eq!(store.table().len(), 1);
    }

    #[test]
    fn test_restore_requires_later_instant() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        let mut v1 = d.clone();
        store.save(&mut d, Some(t(20))).unwrap();
        v1.end = Some(t(20));

        let err = store.restore(&mut v1, Some(t(20))).unwrap_err();
        assert!(matches!(err, DocumentError::OrderingViolation(_)));
        assert!(store.restore(&mut v1, Some(t(21))).unwrap());
        assert_eq!(v1.start, Some(t(21)));
    }

    #[test]
    fn test_restore_without_identity_is_invalid() {
        let (store, _) = store();
        let err = store.restore(&mut doc(1), None).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_get_variants() {
        let (store, _) = store();
        for value in 0..2 {
            store.save(&mut doc(value), Some(t(10))).unwrap();
        }
        assert!(store.get(t(5), &RowFilter::all()).unwrap().is_none());
        let err = store.get(t(15), &RowFilter::all()).unwrap_err();
        assert!(matches!(err, DocumentError::MultipleFound { count: 2, .. }));
        let err = store.get_or_fail(t(5), &RowFilter::all()).unwrap_err();
        assert_eq!(err.status_code(), 404);
        let one = store.get_or_fail(t(15), &RowFilter::all().field("data", 1)).unwrap();
        assert_eq!(one.document_id, Some(2));
    }

    #[test]
    fn test_current_follows_context() {
        let (store, clock) = store();
        let mut d = doc(1);
        store.save(&mut d, None).unwrap();
        clock.tick(10);
        d.set("data", 2);
        store.save(&mut d, None).unwrap();

        let mut ctx = TimeContext::with_clock(clock.clone());
        let filter = RowFilter::all().document_id(1);
        assert_eq!(store.current(&ctx, &filter).unwrap()[0].field("data"), Some(&json!(2)));
        ctx.with_instant(t(1_005), |ctx| {
            assert_eq!(store.current(ctx, &filter).unwrap()[0].field("data"), Some(&json!(1)));
        });
    }

    #[test]
    fn test_history_skips_phantoms() {
        let (store, _) = store();
        let mut d = doc(1);
        store.save(&mut d, Some(t(10))).unwrap();
        store.save(&mut d, Some(t(10))).unwrap();
        let history = store.history(1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, Some(2));
    }
}
