//! Table handle
//!
//! A `Table` owns the state of one document type behind a mutex. Every batch
//! executes under the lock; when the table is durable the batch is journaled
//! and fsynced before the lock is released, and rolled back if the append
//! fails.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::batch::{BatchOutcome, WriteBatch};
use super::errors::TableResult;
use super::filter::{RowFilter, RowOrder};
use super::journal::{JournalReader, JournalWriter};
use super::row::VersionRow;
use super::state::TableState;
use crate::observability::{log_event_with_fields, warn_event, Event};

struct Inner {
    state: TableState,
    journal: Option<JournalWriter>,
}

/// One table of version rows.
pub struct Table {
    name: String,
    inner: Mutex<Inner>,
}

impl Table {
    /// Creates a table that lives only in memory.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: TableState::new(),
                journal: None,
            }),
        }
    }

    /// Opens (or creates) a durable table at `<dir>/<name>.journal`,
    /// replaying every committed batch.
    pub fn open(dir: &Path, name: impl Into<String>) -> TableResult<Self> {
        let name = name.into();
        let path = Self::journal_path(dir, &name);
        let mut state = TableState::new();
        let mut valid_len = 0;
        let mut next_sequence = 1;
        let mut batches = 0u64;

        if path.exists() {
            let mut reader = JournalReader::open(&path)?;
            while let Some(entry) = reader.read_next().inspect_err(|e| {
                log_event_with_fields(
                    Event::JournalCorruption,
                    &[("table", &name), ("error", &e.to_string())],
                );
            })? {
                for mutation in &entry.mutations {
                    state.replay(mutation)?;
                }
                next_sequence = entry.sequence + 1;
                batches += 1;
            }
            valid_len = reader.current_offset();
            if reader.has_torn_tail() {
                warn_event(
                    Event::JournalTornTail,
                    &[("table", &name), ("offset", &valid_len.to_string())],
                );
            }
        }

        let journal = JournalWriter::open(&path, valid_len, next_sequence)?;
        log_event_with_fields(
            Event::TableOpened,
            &[
                ("batches", &batches.to_string()),
                ("rows", &state.len().to_string()),
                ("table", &name),
            ],
        );

        Ok(Self {
            name,
            inner: Mutex::new(Inner {
                state,
                journal: Some(journal),
            }),
        })
    }

    /// The journal location of a durable table named `name` under `dir`.
    pub fn journal_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.journal", name))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Journal path, if the table is durable.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock()
            .journal
            .as_ref()
            .map(|journal| journal.path().to_path_buf())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.lock().state.len()
    }

    /// True when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns matching rows in the requested order.
    pub fn select(&self, filter: &RowFilter, order: RowOrder, limit: Option<usize>) -> Vec<VersionRow> {
        self.lock().state.select(filter, order, limit)
    }

    /// Counts matching rows.
    pub fn count(&self, filter: &RowFilter) -> usize {
        self.lock().state.count(filter)
    }

    /// Largest row id, if any.
    pub fn max_id(&self) -> Option<u64> {
        self.lock().state.max_id()
    }

    /// Smallest and largest `document_id` among matching rows.
    pub fn document_id_bounds(&self, filter: &RowFilter) -> Option<(u64, u64)> {
        self.lock().state.document_id_bounds(filter)
    }

    /// Draws `n` ids from the native sequence.
    pub fn reserve_ids(&self, n: usize) -> Vec<u64> {
        self.lock().state.reserve_ids(n)
    }

    /// Applies a batch atomically.
    pub fn apply(&self, batch: WriteBatch) -> TableResult<BatchOutcome> {
        let mut inner = self.lock();
        let Inner { state, journal } = &mut *inner;

        let applied = state.execute(batch.into_ops())?;
        if let Some(journal) = journal {
            if !applied.mutations.is_empty() {
                if let Err(e) = journal.append(&applied.mutations) {
                    state.rollback(applied);
                    return Err(e);
                }
            }
        }
        Ok(applied.outcome)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("rows", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{NewVersion, Payload, TableErrorCode};
    use crate::time::{Instant, MAX_INSTANT};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn payload(value: i64) -> Payload {
        let mut payload = Payload::new();
        payload.insert("data".into(), json!(value));
        payload
    }

    fn t(micros: i64) -> Instant {
        Instant::from_micros(micros)
    }

    #[test]
    fn test_in_memory_table_has_no_path() {
        let table = Table::in_memory("docs");
        assert!(table.path().is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_reopen_replays_committed_batches() {
        let dir = TempDir::new().unwrap();
        {
            let table = Table::open(dir.path(), "docs").unwrap();
            table
                .apply(WriteBatch::new().insert(NewVersion::new(t(0), MAX_INSTANT, payload(1))))
                .unwrap();
            table
                .apply(
                    WriteBatch::new()
                        .update_end(RowFilter::all().document_id(1).open(), t(10))
                        .insert(
                            NewVersion::new(t(10), MAX_INSTANT, payload(2)).with_document_id(Some(1)),
                        ),
                )
                .unwrap();
        }

        let table = Table::open(dir.path(), "docs").unwrap();
        let rows = table.select(&RowFilter::all(), RowOrder::Id, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].end, t(10));
        assert_eq!(rows[1].document_id, 1);
        assert_eq!(table.reserve_ids(1), vec![3]);
    }

    #[test]
    fn test_failed_batch_is_not_journaled() {
        let dir = TempDir::new().unwrap();
        let path = Table::journal_path(dir.path(), "docs");
        {
            let table = Table::open(dir.path(), "docs").unwrap();
            table
                .apply(WriteBatch::new().insert(NewVersion::new(t(0), MAX_INSTANT, payload(1))))
                .unwrap();
            let before = fs::metadata(&path).unwrap().len();
            let err = table
                .apply(
                    WriteBatch::new()
                        .insert(NewVersion::new(t(5), MAX_INSTANT, payload(2)))
                        .update_end_expecting(RowFilter::all().id(42), t(5), 1),
                )
                .unwrap_err();
            assert_eq!(err.code(), TableErrorCode::ChronoTableGuardFailed);
            assert_eq!(fs::metadata(&path).unwrap().len(), before);
            assert_eq!(table.len(), 1);
        }
        assert_eq!(Table::open(dir.path(), "docs").unwrap().len(), 1);
    }

    #[test]
    fn test_torn_tail_is_discarded_on_open() {
        let dir = TempDir::new().unwrap();
        let path = Table::journal_path(dir.path(), "docs");
        {
            let table = Table::open(dir.path(), "docs").unwrap();
            for value in 0..3 {
                table
                    .apply(WriteBatch::new().insert(NewVersion::new(t(0), MAX_INSTANT, payload(value))))
                    .unwrap();
            }
        }
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let table = Table::open(dir.path(), "docs").unwrap();
        assert_eq!(table.len(), 2);
        table
            .apply(WriteBatch::new().insert(NewVersion::new(t(0), MAX_INSTANT, payload(9))))
            .unwrap();
        drop(table);
        assert_eq!(Table::open(dir.path(), "docs").unwrap().len(), 3);
    }

    #[test]
    fn test_corrupted_journal_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = Table::journal_path(dir.path(), "docs");
        {
            let table = Table::open(dir.path(), "docs").unwrap();
            table
                .apply(WriteBatch::new().insert(NewVersion::new(t(0), MAX_INSTANT, payload(1))))
                .unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes[8] ^= 0x55;
        fs::write(&path, &bytes).unwrap();

        let err = Table::open(dir.path(), "docs").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code(), TableErrorCode::ChronoDataCorruption);
    }

    #[test]
    fn test_failed_append_rolls_back_and_keeps_journal_clean() {
        let dir = TempDir::new().unwrap();
        let path = Table::journal_path(dir.path(), "docs");
        {
            let table = Table::open(dir.path(), "docs").unwrap();
            table
                .apply(WriteBatch::new().insert(NewVersion::new(t(0), MAX_INSTANT, payload(1))))
                .unwrap();
            let before = fs::metadata(&path).unwrap().len();

            table
                .lock()
                .journal
                .as_mut()
                .unwrap()
                .fail_next_append_after(5);
            let err = table
                .apply(
                    WriteBatch::new()
                        .update_end(RowFilter::all().document_id(1).open(), t(5))
                        .insert(NewVersion::new(t(5), MAX_INSTANT, payload(2)).with_document_id(Some(1))),
                )
                .unwrap_err();
            assert_eq!(err.code(), TableErrorCode::ChronoTableWriteFailed);
            assert_eq!(fs::metadata(&path).unwrap().len(), before);
            assert_eq!(table.len(), 1);
            assert_eq!(table.count(&RowFilter::all().open()), 1);

            table
                .apply(WriteBatch::new().insert(NewVersion::new(t(7), MAX_INSTANT, payload(3))))
                .unwrap();
        }

        let table = Table::open(dir.path(), "docs").unwrap();
        let rows = table.select(&RowFilter::all(), RowOrder::Id, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].end, MAX_INSTANT);
        assert_eq!(rows[1].start, t(7));
    }
}
