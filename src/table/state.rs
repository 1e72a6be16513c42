//! In-memory table state
//!
//! Rows are kept in an `id`-ordered map with a secondary `document_id`
//! index. Batches execute against the state directly while recording an undo
//! log; any failure rolls the state back before the error is returned, so a
//! failed batch is never observable.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::batch::{BatchOp, BatchOutcome};
use super::errors::{TableError, TableResult};
use super::filter::{RowFilter, RowOrder};
use super::row::{NewVersion, VersionRow};
use crate::time::Instant;

/// A primitive row change, as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Insert { row: VersionRow },
    SetEnd { id: u64, end: Instant },
    SetStart { id: u64, start: Instant },
    Remove { id: u64 },
}

#[derive(Debug)]
enum Undo {
    Inserted(u64),
    End(u64, Instant),
    Start(u64, Instant),
    Removed(VersionRow),
}

/// Effects of a successfully executed batch, not yet made durable.
#[derive(Debug)]
pub(crate) struct Applied {
    pub outcome: BatchOutcome,
    pub mutations: Vec<Mutation>,
    undo: Vec<Undo>,
    next_id_before: u64,
}

#[derive(Debug)]
pub(crate) struct TableState {
    rows: BTreeMap<u64, VersionRow>,
    by_document: BTreeMap<u64, BTreeSet<u64>>,
    next_id: u64,
}

impl TableState {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_document: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.rows.keys().next_back().copied()
    }

    /// Hands out `n` ids from the native sequence. Ids are never reissued
    /// within one process, even when the reservation is not used.
    pub fn reserve_ids(&mut self, n: usize) -> Vec<u64> {
        let first = self.next_id;
        self.next_id += n as u64;
        (first..self.next_id).collect()
    }

    /// Re-applies a journaled mutation.
    pub fn replay(&mut self, mutation: &Mutation) -> TableResult<()> {
        match mutation {
            Mutation::Insert { row } => {
                if self.rows.contains_key(&row.id) {
                    return Err(TableError::constraint_violation(format!(
                        "journal inserts duplicate id {}",
                        row.id
                    )));
                }
                self.put(row.clone());
            }
            Mutation::SetEnd { id, end } => {
                self.set_end(*id, *end);
            }
            Mutation::SetStart { id, start } => {
                self.set_start(*id, *start);
            }
            Mutation::Remove { id } => {
                self.take(*id);
            }
        }
        Ok(())
    }

    pub fn select(&self, filter: &RowFilter, order: RowOrder, limit: Option<usize>) -> Vec<VersionRow> {
        let mut rows: Vec<VersionRow> = self
            .matching_ids(filter)
            .into_iter()
            .filter_map(|id| self.rows.get(&id).cloned())
            .collect();
        rows.sort_by(|a, b| order.compare(a, b));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        rows
    }

    pub fn count(&self, filter: &RowFilter) -> usize {
        self.matching_ids(filter).len()
    }

    /// Smallest and largest `document_id` among matching rows.
    pub fn document_id_bounds(&self, filter: &RowFilter) -> Option<(u64, u64)> {
        let mut bounds: Option<(u64, u64)> = None;
        for id in self.matching_ids(filter) {
            if let Some(row) = self.rows.get(&id) {
                let d = row.document_id;
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(d), hi.max(d)),
                    None => (d, d),
                });
            }
        }
        bounds
    }

    /// Executes a batch. On error the state is left exactly as it was.
    pub fn execute(&mut self, ops: Vec<BatchOp>) -> TableResult<Applied> {
        let mut applied = Applied {
            outcome: BatchOutcome::default(),
            mutations: Vec::new(),
            undo: Vec::new(),
            next_id_before: self.next_id,
        };
        for (index, op) in ops.into_iter().enumerate() {
            if let Err(e) = self.execute_op(index, op, &mut applied) {
                self.rollback(applied);
                return Err(e);
            }
        }
        Ok(applied)
    }

    /// Reverts an executed batch that could not be made durable.
    pub fn rollback(&mut self, applied: Applied) {
        for undo in applied.undo.into_iter().rev() {
            match undo {
                Undo::Inserted(id) => {
                    self.take(id);
                }
                Undo::End(id, end) => {
                    self.set_end(id, end);
                }
                Undo::Start(id, start) => {
                    self.set_start(id, start);
                }
                Undo::Removed(row) => self.put(row),
            }
        }
        self.next_id = applied.next_id_before;
    }

    fn execute_op(&mut self, index: usize, op: BatchOp, applied: &mut Applied) -> TableResult<()> {
        match op {
            BatchOp::UpdateEnd { filter, end, expect } => {
                let ids = self.matching_ids(&filter);
                check_guard(index, expect, ids.len())?;
                for &id in &ids {
                    if let Some(old) = self.set_end(id, end) {
                        applied.undo.push(Undo::End(id, old));
                        applied.mutations.push(Mutation::SetEnd { id, end });
                    }
                }
                applied.outcome.affected.push(ids.len());
            }
            BatchOp::UpdateStart {
                filter,
                start,
                expect,
            } => {
                let ids = self.matching_ids(&filter);
                check_guard(index, expect, ids.len())?;
                for &id in &ids {
                    if let Some(old) = self.set_start(id, start) {
                        applied.undo.push(Undo::Start(id, old));
                        applied.mutations.push(Mutation::SetStart { id, start });
                    }
                }
                applied.outcome.affected.push(ids.len());
            }
            BatchOp::Delete { filter } => {
                let ids = self.matching_ids(&filter);
                for &id in &ids {
                    if let Some(row) = self.take(id) {
                        applied.undo.push(Undo::Removed(row));
                        applied.mutations.push(Mutation::Remove { id });
                    }
                }
                applied.outcome.affected.push(ids.len());
            }
            BatchOp::Insert { rows } => {
                let count = rows.len();
                for new in rows {
                    let row = self.materialize(new)?;
                    let id = row.id;
                    applied.undo.push(Undo::Inserted(id));
                    applied.mutations.push(Mutation::Insert { row: row.clone() });
                    applied.outcome.inserted.push(id);
                    self.put(row);
                }
                applied.outcome.affected.push(count);
            }
        }
        Ok(())
    }

    /// Assigns identifiers to a new row and checks uniqueness.
    fn materialize(&mut self, new: NewVersion) -> TableResult<VersionRow> {
        let id = match new.id {
            Some(id) => {
                if self.rows.contains_key(&id) {
                    return Err(TableError::constraint_violation(format!(
                        "duplicate id {}",
                        id
                    )));
                }
                id
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        Ok(VersionRow {
            id,
            document_id: new.document_id.unwrap_or(id),
            start: new.start,
            end: new.end,
            payload: new.payload,
        })
    }

    fn matching_ids(&self, filter: &RowFilter) -> Vec<u64> {
        let candidates: Vec<u64> = if let Some(ids) = filter.id_hint() {
            ids.into_iter().collect()
        } else if let Some(documents) = filter.document_id_hint() {
            let mut ids: Vec<u64> = documents
                .iter()
                .filter_map(|d| self.by_document.get(d))
                .flat_map(|set| set.iter().copied())
                .collect();
            ids.sort_unstable();
            ids
        } else {
            match filter.document_id_bounds() {
                (Bound::Unbounded, Bound::Unbounded) => self.rows.keys().copied().collect(),
                (lower, upper) if range_is_empty(lower, upper) => Vec::new(),
                range => {
                    let mut ids: Vec<u64> = self
                        .by_document
                        .range(range)
                        .flat_map(|(_, set)| set.iter().copied())
                        .collect();
                    ids.sort_unstable();
                    ids
                }
            }
        };
        candidates
            .into_iter()
            .filter(|id| self.rows.get(id).map_or(false, |row| filter.matches(row)))
            .collect()
    }

    fn put(&mut self, row: VersionRow) {
        self.next_id = self.next_id.max(row.id + 1);
        self.by_document
            .entry(row.document_id)
            .or_default()
            .insert(row.id);
        self.rows.insert(row.id, row);
    }

    fn take(&mut self, id: u64) -> Option<VersionRow> {
        let row = self.rows.remove(&id)?;
        if let Some(set) = self.by_document.get_mut(&row.document_id) {
            set.remove(&id);
            if set.is_empty() {
                self.by_document.remove(&row.document_id);
            }
        }
        Some(row)
    }

    fn set_end(&mut self, id: u64, end: Instant) -> Option<Instant> {
        self.rows
            .get_mut(&id)
            .map(|row| std::mem::replace(&mut row.end, end))
    }

    fn set_start(&mut self, id: u64, start: Instant) -> Option<Instant> {
        self.rows
            .get_mut(&id)
            .map(|row| std::mem::replace(&mut row.start, start))
    }
}

fn check_guard(index: usize, expect: Option<usize>, actual: usize) -> TableResult<()> {
    match expect {
        Some(expected) if expected != actual => Err(TableError::guard_failed(index, expected, actual)),
        _ => Ok(()),
    }
}

fn range_is_empty(lower: Bound<u64>, upper: Bound<u64>) -> bool {
    matches!((lower, upper), (Bound::Excluded(l), Bound::Included(u)) if l >= u)
}
