//! Range sources and bisectable keys

use std::fmt;

use crate::time::Instant;

/// A key type that can be split between two values.
pub trait Midpoint: Copy + Ord + fmt::Debug {
    /// A key between `low` and `high` (inclusive), rounded towards `low`.
    fn bisect(low: Self, high: Self) -> Self;
}

impl Midpoint for u64 {
    fn bisect(low: Self, high: Self) -> Self {
        if high < low {
            return low;
        }
        low + (high - low) / 2
    }
}

impl Midpoint for i64 {
    fn bisect(low: Self, high: Self) -> Self {
        ((low as i128 + high as i128).div_euclid(2)) as i64
    }
}

impl Midpoint for Instant {
    fn bisect(low: Self, high: Self) -> Self {
        Instant::from_micros(<i64 as Midpoint>::bisect(low.as_micros(), high.as_micros()))
    }
}

/// An ordered collection that can be counted and fetched by key range.
///
/// Ranges are half-open on the left: `(low, high]`, where `None` leaves the
/// lower end unbounded. Rows fetched for one range come back in the
/// collection's full sort order, whose leading component is the key.
pub trait RangeSource {
    type Key: Midpoint;
    type Row;

    /// Smallest and largest key, or `None` when the source is empty.
    fn key_bounds(&self) -> Option<(Self::Key, Self::Key)>;

    /// Total number of rows.
    fn count_all(&self) -> usize;

    /// Number of rows with key in `(low, high]`.
    fn count_between(&self, low: Option<Self::Key>, high: Self::Key) -> usize;

    /// Every row, in order.
    fn fetch_all(&self) -> Vec<Self::Row>;

    /// Rows with key in `(low, high]`, in order.
    fn fetch_between(&self, low: Option<Self::Key>, high: Self::Key) -> Vec<Self::Row>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoints_round_down() {
        assert_eq!(<u64 as Midpoint>::bisect(3, 4), 3);
        assert_eq!(<u64 as Midpoint>::bisect(0, u64::MAX), u64::MAX / 2);
        assert_eq!(<i64 as Midpoint>::bisect(-3, 0), -2);
        assert_eq!(<i64 as Midpoint>::bisect(i64::MIN, i64::MAX), -1);
        assert_eq!(
            Instant::bisect(Instant::from_micros(10), Instant::from_micros(21)),
            Instant::from_micros(15)
        );
    }
}
