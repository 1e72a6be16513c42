//! Row filters and orderings
//!
//! A `RowFilter` is a conjunction of predicates. The table uses the
//! identifier predicates to narrow the candidate set through its indexes and
//! evaluates the rest row by row.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

use serde_json::Value;

use super::row::VersionRow;
use crate::time::{Instant, FUTURE};

/// A single predicate over a version row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IdEq(u64),
    IdIn(BTreeSet<u64>),
    DocumentIdEq(u64),
    DocumentIdIn(BTreeSet<u64>),
    /// `document_id > value`
    DocumentIdAbove(u64),
    /// `document_id <= value`
    DocumentIdAtMost(u64),
    StartLte(Instant),
    StartLt(Instant),
    StartGt(Instant),
    StartNe(Instant),
    EndGt(Instant),
    EndLte(Instant),
    EndLt(Instant),
    EndEq(Instant),
    EndNe(Instant),
    /// `end > FUTURE`
    Open,
    /// `end <= FUTURE`
    Closed,
    /// `start < end`
    Proper,
    /// `start >= end`
    Phantom,
    /// `end < start`
    Reversed,
    /// `end == start`
    ZeroLength,
    /// Payload field equality
    Field(String, Value),
}

impl Predicate {
    /// Evaluates the predicate against a row.
    pub fn matches(&self, row: &VersionRow) -> bool {
        match self {
            Predicate::IdEq(id) => row.id == *id,
            Predicate::IdIn(ids) => ids.contains(&row.id),
            Predicate::DocumentIdEq(d) => row.document_id == *d,
            Predicate::DocumentIdIn(ds) => ds.contains(&row.document_id),
            Predicate::DocumentIdAbove(d) => row.document_id > *d,
            Predicate::DocumentIdAtMost(d) => row.document_id <= *d,
            Predicate::StartLte(t) => row.start <= *t,
            Predicate::StartLt(t) => row.start < *t,
            Predicate::StartGt(t) => row.start > *t,
            Predicate::StartNe(t) => row.start != *t,
            Predicate::EndGt(t) => row.end > *t,
            Predicate::EndLte(t) => row.end <= *t,
            Predicate::EndLt(t) => row.end < *t,
            Predicate::EndEq(t) => row.end == *t,
            Predicate::EndNe(t) => row.end != *t,
            Predicate::Open => row.end > FUTURE,
            Predicate::Closed => row.end <= FUTURE,
            Predicate::Proper => row.start < row.end,
            Predicate::Phantom => row.start >= row.end,
            Predicate::Reversed => row.end < row.start,
            Predicate::ZeroLength => row.end == row.start,
            Predicate::Field(name, value) => row.payload.get(name) == Some(value),
        }
    }
}

/// A conjunction of predicates. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    predicates: Vec<Predicate>,
}

impl RowFilter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an arbitrary predicate.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn id(self, id: u64) -> Self {
        self.and(Predicate::IdEq(id))
    }

    pub fn ids(self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.and(Predicate::IdIn(ids.into_iter().collect()))
    }

    pub fn document_id(self, document_id: u64) -> Self {
        self.and(Predicate::DocumentIdEq(document_id))
    }

    pub fn document_ids(self, document_ids: impl IntoIterator<Item = u64>) -> Self {
        self.and(Predicate::DocumentIdIn(document_ids.into_iter().collect()))
    }

    /// Restricts to `document_id` in `(lower, upper]`; `None` leaves the
    /// lower end unbounded.
    pub fn document_id_range(self, lower: Option<u64>, upper: u64) -> Self {
        let filter = self.and(Predicate::DocumentIdAtMost(upper));
        match lower {
            Some(lower) => filter.and(Predicate::DocumentIdAbove(lower)),
            None => filter,
        }
    }

    /// Rows valid at `instant`.
    pub fn valid_at(self, instant: Instant) -> Self {
        self.and(Predicate::StartLte(instant))
            .and(Predicate::EndGt(instant))
    }

    pub fn open(self) -> Self {
        self.and(Predicate::Open)
    }

    pub fn closed(self) -> Self {
        self.and(Predicate::Closed)
    }

    pub fn field(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::Field(name.into(), value.into()))
    }

    /// Appends every predicate of `other`.
    pub fn merge(mut self, other: &RowFilter) -> Self {
        self.predicates.extend(other.predicates.iter().cloned());
        self
    }

    /// Returns the predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True when every predicate holds.
    pub fn matches(&self, row: &VersionRow) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// The narrowest id set implied by the filter, if any.
    pub(crate) fn id_hint(&self) -> Option<BTreeSet<u64>> {
        let mut hint: Option<BTreeSet<u64>> = None;
        for predicate in &self.predicates {
            let ids: BTreeSet<u64> = match predicate {
                Predicate::IdEq(id) => std::iter::once(*id).collect(),
                Predicate::IdIn(ids) => ids.clone(),
                _ => continue,
            };
            hint = Some(match hint {
                Some(current) => current.intersection(&ids).copied().collect(),
                None => ids,
            });
        }
        hint
    }

    /// The document ids implied by equality/set predicates, if any.
    pub(crate) fn document_id_hint(&self) -> Option<BTreeSet<u64>> {
        let mut hint: Option<BTreeSet<u64>> = None;
        for predicate in &self.predicates {
            let ids: BTreeSet<u64> = match predicate {
                Predicate::DocumentIdEq(d) => std::iter::once(*d).collect(),
                Predicate::DocumentIdIn(ds) => ds.clone(),
                _ => continue,
            };
            hint = Some(match hint {
                Some(current) => current.intersection(&ids).copied().collect(),
                None => ids,
            });
        }
        hint
    }

    /// The `document_id` range implied by range predicates.
    pub(crate) fn document_id_bounds(&self) -> (Bound<u64>, Bound<u64>) {
        let mut lower = Bound::Unbounded;
        let mut upper = Bound::Unbounded;
        for predicate in &self.predicates {
            match predicate {
                Predicate::DocumentIdAbove(d) => {
                    lower = match lower {
                        Bound::Excluded(cur) if cur >= *d => Bound::Excluded(cur),
                        _ => Bound::Excluded(*d),
                    };
                }
                Predicate::DocumentIdAtMost(d) => {
                    upper = match upper {
                        Bound::Included(cur) if cur <= *d => Bound::Included(cur),
                        _ => Bound::Included(*d),
                    };
                }
                _ => {}
            }
        }
        (lower, upper)
    }
}

/// Result orderings supported by `select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Ascending `id`
    Id,
    /// Ascending `(document_id, id)`
    DocumentId,
    /// Ascending `(document_id, start, end, id)`; the integrity scan order
    DocumentStartEnd,
    /// Descending `start`, then descending `id`
    StartDesc,
    /// Descending `end`, then descending `id`
    EndDesc,
}

impl RowOrder {
    /// Compares two rows under this ordering.
    pub fn compare(&self, a: &VersionRow, b: &VersionRow) -> Ordering {
        match self {
            RowOrder::Id => a.id.cmp(&b.id),
            RowOrder::DocumentId => (a.document_id, a.id).cmp(&(b.document_id, b.id)),
            RowOrder::DocumentStartEnd => (a.document_id, a.start, a.end, a.id)
                .cmp(&(b.document_id, b.start, b.end, b.id)),
            RowOrder::StartDesc => (b.start, b.id).cmp(&(a.start, a.id)),
            RowOrder::EndDesc => (b.end, b.id).cmp(&(a.end, a.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Payload;
    use crate::time::MAX_INSTANT;
    use serde_json::json;

    fn row(id: u64, document_id: u64, start: i64, end: Instant) -> VersionRow {
        let mut payload = Payload::new();
        payload.insert("data".into(), json!(id));
        VersionRow {
            id,
            document_id,
            start: Instant::from_micros(start),
            end,
            payload,
        }
    }

    #[test]
    fn test_valid_at_is_half_open() {
        let r = row(1, 1, 10, Instant::from_micros(20));
        assert!(RowFilter::all().valid_at(Instant::from_micros(10)).matches(&r));
        assert!(!RowFilter::all().valid_at(Instant::from_micros(20)).matches(&r));
    }

    #[test]
    fn test_open_filter_uses_future_threshold() {
        let open = row(1, 1, 10, MAX_INSTANT);
        let overflowed = row(2, 1, 10, MAX_INSTANT.plus_micros(3));
        let closed = row(3, 1, 10, FUTURE);
        let filter = RowFilter::all().open();
        assert!(filter.matches(&open));
        assert!(filter.matches(&overflowed));
        assert!(!filter.matches(&closed));
    }

    #[test]
    fn test_field_predicate() {
        let r = row(7, 1, 0, MAX_INSTANT);
        assert!(RowFilter::all().field("data", 7).matches(&r));
        assert!(!RowFilter::all().field("data", 8).matches(&r));
        assert!(!RowFilter::all().field("missing", 7).matches(&r));
    }

    #[test]
    fn test_hints_intersect() {
        let filter = RowFilter::all().ids([1, 2, 3]).id(2);
        assert_eq!(filter.id_hint(), Some([2].into_iter().collect()));
        let filter = RowFilter::all().document_ids([4, 5]).document_id(9);
        assert_eq!(filter.document_id_hint(), Some(BTreeSet::new()));
        assert_eq!(RowFilter::all().open().id_hint(), None);
    }

    #[test]
    fn test_document_id_bounds_take_tightest() {
        let filter = RowFilter::all()
            .document_id_range(Some(3), 10)
            .document_id_range(Some(5), 8);
        assert_eq!(
            filter.document_id_bounds(),
            (Bound::Excluded(5), Bound::Included(8))
        );
    }

    #[test]
    fn test_scan_order() {
        let a = row(9, 1, 5, MAX_INSTANT);
        let b = row(1, 1, 7, MAX_INSTANT);
        let c = row(2, 2, 0, MAX_INSTANT);
        let mut rows = vec![c.clone(), b.clone(), a.clone()];
        rows.sort_by(|x, y| RowOrder::DocumentStartEnd.compare(x, y));
        assert_eq!(
            rows.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![9, 1, 2]
        );
        rows.sort_by(|x, y| RowOrder::StartDesc.compare(x, y));
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 9, 2]);
    }
}
