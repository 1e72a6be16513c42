//! Window planning by adaptive bisection
//!
//! A plan is a list of boundaries `(key, cumulative)`, where `cumulative` is
//! the number of rows with key `<= key`. Window `i` covers
//! `(boundary[i-1].key, boundary[i].key]`; window 0 covers every key
//! `<= boundary[0].key`. Planning starts from the two key extremes and
//! repeats two steps until neither applies:
//!
//! - merge: drop a boundary whose two neighbouring windows together hold
//!   fewer than `window` rows;
//! - split: insert the key midpoint into a window holding more than `window`
//!   rows, provided a key strictly inside the window exists.
//!
//! A single key with more than `window` rows cannot be split and stays one
//! oversize window.

use super::source::{Midpoint, RangeSource};

/// One window boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary<K> {
    /// Inclusive upper key of the window
    pub key: K,
    /// Rows with key `<= key`
    pub cumulative: usize,
}

/// How a scan will read its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPlan<K> {
    /// Nothing to read
    Empty,
    /// Small enough to read in one fetch
    Single { rows: usize },
    /// Read window by window
    Windows {
        total: usize,
        boundaries: Vec<Boundary<K>>,
    },
}

impl<K: Midpoint> ScanPlan<K> {
    /// Computes the plan for `source` with at most `window` rows per fetch,
    /// oversize single-key windows aside.
    pub fn build<S>(source: &S, window: usize) -> Self
    where
        S: RangeSource<Key = K>,
    {
        let window = window.max(1);
        let total = source.count_all();
        if total == 0 {
            return ScanPlan::Empty;
        }
        if total <= window {
            return ScanPlan::Single { rows: total };
        }
        let (min, max) = match source.key_bounds() {
            Some(bounds) => bounds,
            None => return ScanPlan::Empty,
        };

        let mut boundaries = vec![Boundary {
            key: min,
            cumulative: source.count_between(None, min),
        }];
        if max > min {
            boundaries.push(Boundary {
                key: max,
                cumulative: total,
            });
        }
        while refine(source, &mut boundaries, window) {}

        ScanPlan::Windows { total, boundaries }
    }

    /// Number of fetches the plan performs.
    pub fn window_count(&self) -> usize {
        match self {
            ScanPlan::Empty => 0,
            ScanPlan::Single { .. } => 1,
            ScanPlan::Windows { boundaries, .. } => boundaries.len(),
        }
    }

    /// Row count known when planning.
    pub fn total(&self) -> usize {
        match self {
            ScanPlan::Empty => 0,
            ScanPlan::Single { rows } => *rows,
            ScanPlan::Windows { total, .. } => *total,
        }
    }

    /// Key ranges `(low, high]` of the windows, in order.
    pub fn ranges(&self) -> Vec<(Option<K>, K)> {
        match self {
            ScanPlan::Windows { boundaries, .. } => boundaries
                .iter()
                .enumerate()
                .map(|(i, b)| {
                    let low = if i == 0 { None } else { Some(boundaries[i - 1].key) };
                    (low, b.key)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Performs one merge or split. Returns false once the plan is stable.
fn refine<S: RangeSource>(source: &S, boundaries: &mut Vec<Boundary<S::Key>>, window: usize) -> bool {
    let mut previous = boundaries[0];
    for i in 0..boundaries.len() {
        let current = boundaries[i];
        if i >= 2 && current.cumulative.saturating_sub(boundaries[i - 2].cumulative) < window {
            boundaries.remove(i - 1);
            return true;
        }
        if current.cumulative.saturating_sub(previous.cumulative) > window {
            let middle = S::Key::bisect(previous.key, current.key);
            if previous.key < middle && middle < current.key {
                let cumulative = source.count_between(Some(previous.key), middle) + previous.cumulative;
                boundaries.insert(
                    i,
                    Boundary {
                        key: middle,
                        cumulative,
                    },
                );
                return true;
            }
        }
        previous = current;
    }
    false
}
