//! Bulk version writer
//!
//! Saves or deletes many documents in one table batch. The batch succeeds or
//! fails as a whole.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::errors::{DocumentError, DocumentResult};
use super::model::Document;
use super::store::VersionStore;
use crate::observability::{log_event_with_fields, warn_event, Event};
use crate::table::{NewVersion, RowFilter, WriteBatch};
use crate::time::{Instant, TimeContext, MAX_INSTANT};

/// How a bulk save obtains ids for its new rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Draw from the table's native sequence.
    #[default]
    Sequence,
    /// Use `max(id) + 1 ..= max(id) + n`. Two concurrent writers can pick
    /// the same ids; one of them then fails with a constraint violation.
    MaxPlusOne,
}

impl VersionStore {
    fn allocate_ids(&self, n: usize) -> Vec<u64> {
        match self.id_strategy() {
            IdStrategy::Sequence => self.table().reserve_ids(n),
            IdStrategy::MaxPlusOne => {
                let max = self.table().max_id().unwrap_or(0);
                (max + 1..=max + n as u64).collect()
            }
        }
    }

    /// Saves every document as a new version starting at `start` (default:
    /// now).
    ///
    /// Documents carrying both `id` and `document_id` are closed with a guard;
    /// if any of them is no longer open the whole batch fails with
    /// `BatchConflict`. Documents carrying only `document_id` close whatever
    /// is open. A `document_id` may appear at most once per batch. On
    /// success every document describes its new open version.
    pub fn bulk_save(&self, documents: &mut [Document], start: Option<Instant>) -> DocumentResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let start = start.unwrap_or_else(|| self.real_now());

        let mut guarded = Vec::new();
        let mut unguarded = Vec::new();
        let mut seen = HashSet::new();
        for document in documents.iter() {
            if let Some(previous) = document.start {
                if previous > start {
                    return Err(DocumentError::OrderingViolation(format!(
                        "batch start {} precedes a document start {}",
                        start, previous
                    )));
                }
            }
            if let Some(document_id) = document.document_id {
                if !seen.insert(document_id) {
                    return Err(DocumentError::InvalidDocument(format!(
                        "document_id {} appears more than once in one batch",
                        document_id
                    )));
                }
            }
            match (document.document_id, document.id) {
                (Some(_), Some(id)) => guarded.push(id),
                (Some(document_id), None) => unguarded.push(document_id),
                (None, _) => {}
            }
        }

        let mut batch = WriteBatch::new();
        if !guarded.is_empty() {
            let expected = guarded.len();
            batch = batch.update_end_expecting(RowFilter::all().ids(guarded).open(), start, expected);
        }
        if !unguarded.is_empty() {
            batch = batch.update_end(RowFilter::all().document_ids(unguarded).open(), start);
        }

        let ids = self.allocate_ids(documents.len());
        let rows = documents
            .iter()
            .zip(&ids)
            .map(|(document, &id)| {
                NewVersion::new(start, MAX_INSTANT, document.payload.clone())
                    .with_id(id)
                    .with_document_id(Some(document.document_id.unwrap_or(id)))
            })
            .collect();
        batch = batch.insert_all(rows);

        self.table().apply(batch).map_err(|e| match e.guard() {
            Some(guard) => {
                warn_event(
                    Event::VersionConflict,
                    &[
                        ("actual", &guard.actual.to_string()),
                        ("expected", &guard.expected.to_string()),
                        ("table", self.table().name()),
                    ],
                );
                DocumentError::BatchConflict {
                    expected: guard.expected,
                    actual: guard.actual,
                }
            }
            None => DocumentError::Table(e),
        })?;

        for (document, id) in documents.iter_mut().zip(ids) {
            document.id = Some(id);
            document.document_id = Some(document.document_id.unwrap_or(id));
            document.start = Some(start);
            document.end = Some(MAX_INSTANT);
        }
        log_event_with_fields(
            Event::BulkSaved,
            &[
                ("count", &documents.len().to_string()),
                ("table", self.table().name()),
            ],
        );
        Ok(())
    }

    /// Bulk save at the context's current instant.
    pub fn bulk_save_now(&self, ctx: &TimeContext, documents: &mut [Document]) -> DocumentResult<()> {
        self.bulk_save(documents, Some(ctx.now()))
    }

    /// Closes the open version of every document at `at` (default: now).
    /// Returns the number of versions closed.
    pub fn bulk_delete(&self, documents: &[Document], at: Option<Instant>) -> DocumentResult<usize> {
        let document_ids: Vec<u64> = documents.iter().filter_map(|d| d.document_id).collect();
        if document_ids.is_empty() {
            return Ok(0);
        }
        let at = at.unwrap_or_else(|| self.real_now());
        let outcome = self.table().apply(
            WriteBatch::new().update_end(RowFilter::all().document_ids(document_ids).open(), at),
        )?;
        log_event_with_fields(
            Event::BulkDeleted,
            &[
                ("closed", &outcome.total_affected().to_string()),
                ("table", self.table().name()),
            ],
        );
        Ok(outcome.total_affected())
    }

    /// Bulk delete at the context's current instant.
    pub fn bulk_delete_now(&self, ctx: &TimeContext, documents: &[Document]) -> DocumentResult<usize> {
        self.bulk_delete(documents, Some(ctx.now()))
    }
}
