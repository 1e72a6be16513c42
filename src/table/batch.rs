//! Write batches
//!
//! A batch is an ordered list of operations applied atomically: either every
//! operation takes effect, or none does. Updates may carry a guard, the exact
//! number of rows they must affect. A guard mismatch aborts the whole batch;
//! this is the compare-and-swap primitive the version store builds its
//! lost-update detection on.

use super::filter::RowFilter;
use super::row::NewVersion;
use crate::time::Instant;

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Set `end` on every matching row
    UpdateEnd {
        filter: RowFilter,
        end: Instant,
        expect: Option<usize>,
    },
    /// Set `start` on every matching row
    UpdateStart {
        filter: RowFilter,
        start: Instant,
        expect: Option<usize>,
    },
    /// Remove every matching row
    Delete { filter: RowFilter },
    /// Insert rows in order
    Insert { rows: Vec<NewVersion> },
}

/// An ordered, atomic list of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `end` on matching rows.
    pub fn update_end(mut self, filter: RowFilter, end: Instant) -> Self {
        self.ops.push(BatchOp::UpdateEnd {
            filter,
            end,
            expect: None,
        });
        self
    }

    /// Sets `end` on matching rows; the batch fails unless exactly `expect`
    /// rows match.
    pub fn update_end_expecting(mut self, filter: RowFilter, end: Instant, expect: usize) -> Self {
        self.ops.push(BatchOp::UpdateEnd {
            filter,
            end,
            expect: Some(expect),
        });
        self
    }

    /// Sets `start` on matching rows.
    pub fn update_start(mut self, filter: RowFilter, start: Instant) -> Self {
        self.ops.push(BatchOp::UpdateStart {
            filter,
            start,
            expect: None,
        });
        self
    }

    /// Removes matching rows.
    pub fn delete(mut self, filter: RowFilter) -> Self {
        self.ops.push(BatchOp::Delete { filter });
        self
    }

    /// Inserts one row.
    pub fn insert(self, row: NewVersion) -> Self {
        self.insert_all(vec![row])
    }

    /// Inserts rows in one statement.
    pub fn insert_all(mut self, rows: Vec<NewVersion>) -> Self {
        self.ops.push(BatchOp::Insert { rows });
        self
    }

    /// Returns the operations.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// True when the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Result of a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows affected per operation, in batch order (inserted rows for inserts)
    pub affected: Vec<usize>,
    /// Ids of inserted rows, in insertion order
    pub inserted: Vec<u64>,
}

impl BatchOutcome {
    /// Total rows touched by the batch.
    pub fn total_affected(&self) -> usize {
        self.affected.iter().sum()
    }
}
