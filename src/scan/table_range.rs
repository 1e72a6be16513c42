//! Table rows as a range source keyed on `document_id`
//!
//! Windows never split a document: every window covers whole
//! `document_id` values, so rows of one document arrive together, ordered by
//! `(start, end)`.

use super::source::RangeSource;
use crate::table::{RowFilter, RowOrder, Table, VersionRow};

/// The rows of a table matching a filter, in `(document_id, start, end)`
/// order.
pub struct TableRange<'t> {
    table: &'t Table,
    filter: RowFilter,
}

impl<'t> TableRange<'t> {
    /// Every row of `table`.
    pub fn new(table: &'t Table) -> Self {
        Self::filtered(table, RowFilter::all())
    }

    /// Rows of `table` matching `filter`.
    pub fn filtered(table: &'t Table, filter: RowFilter) -> Self {
        Self { table, filter }
    }

    fn window_filter(&self, low: Option<u64>, high: u64) -> RowFilter {
        self.filter.clone().document_id_range(low, high)
    }
}

impl RangeSource for TableRange<'_> {
    type Key = u64;
    type Row = VersionRow;

    fn key_bounds(&self) -> Option<(u64, u64)> {
        self.table.document_id_bounds(&self.filter)
    }

    fn count_all(&self) -> usize {
        self.table.count(&self.filter)
    }

    fn count_between(&self, low: Option<u64>, high: u64) -> usize {
        self.table.count(&self.window_filter(low, high))
    }

    fn fetch_all(&self) -> Vec<VersionRow> {
        self.table
            .select(&self.filter, RowOrder::DocumentStartEnd, None)
    }

    fn fetch_between(&self, low: Option<u64>, high: u64) -> Vec<VersionRow> {
        self.table.select(
            &self.window_filter(low, high),
            RowOrder::DocumentStartEnd,
            None,
        )
    }
}
