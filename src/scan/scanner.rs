//! Chunked range scanner

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::plan::ScanPlan;
use super::source::RangeSource;
use crate::observability::{log_event_with_fields, Event, Logger};

/// Requests that a running scan stop at the next window boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Summary of a finished (or cancelled) scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Windows fetched
    pub windows: usize,
    /// Rows yielded
    pub rows: usize,
    /// True when the scan stopped early on request
    pub cancelled: bool,
}

/// Streams a [`RangeSource`] in bounded windows.
pub struct ChunkedScanner<'s, S: RangeSource> {
    source: &'s S,
    window: usize,
    cancel: CancelToken,
    label: String,
}

impl<'s, S: RangeSource> ChunkedScanner<'s, S> {
    /// A scanner fetching at most `window` rows at a time (a zero window is
    /// treated as one).
    pub fn new(source: &'s S, window: usize) -> Self {
        Self {
            source,
            window: window.max(1),
            cancel: CancelToken::new(),
            label: String::new(),
        }
    }

    /// Observes `token` between windows.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Name used in log lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Computes the window plan.
    pub fn plan(&self) -> ScanPlan<S::Key> {
        ScanPlan::build(self.source, self.window)
    }

    /// Iterates over the windows, planning first.
    pub fn windows(&self) -> Windows<'s, S> {
        let plan = self.plan();
        log_event_with_fields(
            Event::ScanPlanned,
            &[
                ("rows", &plan.total().to_string()),
                ("source", &self.label),
                ("window", &self.window.to_string()),
                ("windows", &plan.window_count().to_string()),
            ],
        );
        Windows {
            source: self.source,
            single: matches!(plan, ScanPlan::Single { .. }),
            ranges: plan.ranges(),
            position: 0,
            cancel: self.cancel.clone(),
            label: self.label.clone(),
            cancelled: false,
        }
    }

    /// Feeds every row to `visit`, in order.
    pub fn for_each<F>(&self, mut visit: F) -> ScanSummary
    where
        F: FnMut(S::Row),
    {
        let mut summary = ScanSummary::default();
        let mut windows = self.windows();
        for rows in windows.by_ref() {
            summary.windows += 1;
            summary.rows += rows.len();
            rows.into_iter().for_each(&mut visit);
        }
        summary.cancelled = windows.was_cancelled();
        summary
    }

    /// Like [`for_each`](Self::for_each), stopping at the first error.
    pub fn try_for_each<F, E>(&self, mut visit: F) -> Result<ScanSummary, E>
    where
        F: FnMut(S::Row) -> Result<(), E>,
    {
        let mut summary = ScanSummary::default();
        let mut windows = self.windows();
        for rows in windows.by_ref() {
            summary.windows += 1;
            summary.rows += rows.len();
            for row in rows {
                visit(row)?;
            }
        }
        summary.cancelled = windows.was_cancelled();
        Ok(summary)
    }
}

/// Iterator over the windows of a scan; each item is one fetch.
pub struct Windows<'s, S: RangeSource> {
    source: &'s S,
    single: bool,
    ranges: Vec<(Option<S::Key>, S::Key)>,
    position: usize,
    cancel: CancelToken,
    label: String,
    cancelled: bool,
}

impl<S: RangeSource> Windows<'_, S> {
    /// True when the iterator stopped because of cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn remaining(&self) -> usize {
        if self.single {
            1 - self.position.min(1)
        } else {
            self.ranges.len().saturating_sub(self.position)
        }
    }
}

impl<S: RangeSource> Iterator for Windows<'_, S> {
    type Item = Vec<S::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancelled || self.remaining() == 0 {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            log_event_with_fields(
                Event::ScanCancelled,
                &[
                    ("source", &self.label),
                    ("window", &self.position.to_string()),
                ],
            );
            return None;
        }

        let rows = if self.single {
            self.source.fetch_all()
        } else {
            let (low, high) = self.ranges[self.position];
            self.source.fetch_between(low, high)
        };
        Logger::trace(
            Event::ScanWindow.as_str(),
            &[
                ("rows", &rows.len().to_string()),
                ("source", &self.label),
                ("window", &self.position.to_string()),
            ],
        );
        self.position += 1;
        Some(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pairs(Vec<(i64, u32)>);

    impl RangeSource for Pairs {
        type Key = i64;
        type Row = (i64, u32);

        fn key_bounds(&self) -> Option<(i64, i64)> {
            Some((self.0.first()?.0, self.0.last()?.0))
        }
        fn count_all(&self) -> usize {
            self.0.len()
        }
        fn count_between(&self, low: Option<i64>, high: i64) -> usize {
            self.fetch_between(low, high).len()
        }
        fn fetch_all(&self) -> Vec<(i64, u32)> {
            self.0.clone()
        }
        fn fetch_between(&self, low: Option<i64>, high: i64) -> Vec<(i64, u32)> {
            self.0
                .iter()
                .copied()
                .filter(|(k, _)| low.map_or(true, |l| *k > l) && *k <= high)
                .collect()
        }
    }

    fn dataset() -> Pairs {
        let mut rows = Vec::new();
        for key in -20..20i64 {
            for n in 0..(key.rem_euclid(4) as u32) {
                rows.push((key, n));
            }
        }
        Pairs(rows)
    }

    #[test]
    fn test_concatenation_matches_source_for_every_window() {
        let source = dataset();
        for window in 1..=source.0.len() + 2 {
            let mut seen = Vec::new();
            let summary = ChunkedScanner::new(&source, window).for_each(|row| seen.push(row));
            assert_eq!(seen, source.0, "window {}", window);
            assert_eq!(summary.rows, source.0.len());
            assert!(!summary.cancelled);
        }
    }

    #[test]
    fn test_cancel_stops_between_windows() {
        let source = dataset();
        let token = CancelToken::new();
        let scanner = ChunkedScanner::new(&source, 3).with_cancel(token.clone());
        let mut windows = scanner.windows();
        let first = windows.next().unwrap();
        assert!(!first.is_empty());
        token.cancel();
        assert!(windows.next().is_none());
        assert!(windows.was_cancelled());
    }

    #[test]
    fn test_cancelled_before_start_reads_nothing() {
        let source = dataset();
        let token = CancelToken::new();
        token.cancel();
        let summary = ChunkedScanner::new(&source, 1000)
            .with_cancel(token)
            .for_each(|_| panic!("no rows expected"));
        assert!(summary.cancelled);
        assert_eq!(summary.windows, 0);
    }

    #[test]
    fn test_try_for_each_propagates_error() {
        let source = dataset();
        let result: Result<ScanSummary, String> =
            ChunkedScanner::new(&source, 2).try_for_each(|(key, _)| {
                if key > 0 {
                    Err(format!("stop at {}", key))
                } else {
                    Ok(())
                }
            });
        assert_eq!(result.unwrap_err(), "stop at 1");
    }
}
