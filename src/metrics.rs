use crate::aggregate::DateBucketStore;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// One day of the dense, averaged series.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub created: u64,
    pub closed: u64,
    /// Running count of open issues; negative only when the source data is inconsistent.
    pub open: i64,
    /// `None` until a full window of days has been seen.
    pub created_avg: Option<f64>,
    pub closed_avg: Option<f64>,
    pub open_avg: Option<f64>,
}

/// Trailing W-day average maintained as a sliding sum.
///
/// Each day adds `value / W` and, once W days have been seen, drops the oldest
/// contribution. The history starts with a single `0.0` that is the first thing
/// dropped, so the sum at day W covers exactly days 1..=W.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: usize,
    running_sum: f64,
    history: VecDeque<f64>,
    days_seen: usize,
}

impl SlidingWindow {
    pub fn new(window: NonZeroUsize) -> Self {
        let window = window.get();
        let mut history = VecDeque::with_capacity(window + 1);
        history.push_back(0.0);
        Self {
            window,
            running_sum: 0.0,
            history,
            days_seen: 0,
        }
    }

    /// Adds one day's value and returns the average, if the window is full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.days_seen += 1;

        let contribution = value / self.window as f64;
        self.running_sum += contribution;
        self.history.push_back(contribution);

        if self.days_seen < self.window {
            return None;
        }
        if let Some(oldest) = self.history.pop_front() {
            self.running_sum -= oldest;
        }
        Some(self.running_sum)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Walks every calendar day between the first and last bucket, filling gaps with
/// zero counts, and derives the open count and the moving averages.
///
/// Returns an empty series when the store is empty.
pub fn calculate_series(store: &DateBucketStore, window: NonZeroUsize) -> Vec<DayRecord> {
    let Some((start, end)) = store.date_range() else {
        tracing::info!("No issues logged, nothing to calculate.");
        return Vec::new();
    };

    let mut created_window = SlidingWindow::new(window);
    let mut closed_window = SlidingWindow::new(window);
    let mut open_window = SlidingWindow::new(window);

    let mut open: i64 = 0;
    let mut series = Vec::new();

    for date in start.iter_days().take_while(|d| *d <= end) {
        let counts = store.get(date);
        open += counts.created as i64 - counts.closed as i64;

        series.push(DayRecord {
            date,
            created: counts.created,
            closed: counts.closed,
            open,
            created_avg: created_window.push(counts.created as f64),
            closed_avg: closed_window.push(counts.closed as f64),
            open_avg: open_window.push(open as f64),
        });
    }

    tracing::debug!(days = series.len(), window = window.get(), "Calculated moving averages");
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window(w: usize) -> NonZeroUsize {
        NonZeroUsize::new(w).unwrap()
    }

    fn store_with(entries: &[(NaiveDate, u64, u64)]) -> DateBucketStore {
        let mut store = DateBucketStore::new();
        for &(date, created, closed) in entries {
            let counts = store.get_or_insert_default(date);
            counts.created += created;
            counts.closed += closed;
        }
        store
    }

    #[test]
    fn test_calculate_series_empty() {
        let series = calculate_series(&DateBucketStore::new(), window(30));
        assert!(series.is_empty());
    }

    #[test]
    fn test_series_is_dense_across_gaps() {
        let store = store_with(&[(ymd(2021, 1, 30), 1, 0), (ymd(2021, 2, 3), 0, 1)]);
        let series = calculate_series(&store, window(2));

        assert_eq!(series.len(), 5);
        for pair in series.windows(2) {
            assert_eq!(pair[0].date.succ_opt(), Some(pair[1].date));
        }
        assert_eq!(series[1].created, 0);
        assert_eq!(series[1].open, 1);
        assert_eq!(series[4].open, 0);
    }

    #[test]
    fn test_open_follows_created_minus_closed() {
        let store = store_with(&[
            (ymd(2021, 1, 5), 2, 0),
            (ymd(2021, 1, 6), 1, 1),
            (ymd(2021, 1, 8), 0, 3),
        ]);
        let series = calculate_series(&store, window(3));

        let mut previous = 0;
        for day in &series {
            assert_eq!(day.open, previous + day.created as i64 - day.closed as i64);
            previous = day.open;
        }
        // More closures than creations are surfaced as-is.
        assert_eq!(series.last().unwrap().open, -1);
    }

    #[test]
    fn test_averages_absent_during_warm_up() {
        let store = store_with(&[(ymd(2021, 1, 1), 3, 0), (ymd(2021, 1, 10), 0, 0)]);
        let series = calculate_series(&store, window(4));

        for day in &series[..3] {
            assert_eq!(day.created_avg, None);
            assert_eq!(day.closed_avg, None);
            assert_eq!(day.open_avg, None);
        }
        for day in &series[3..] {
            assert!(day.created_avg.is_some());
            assert!(day.closed_avg.is_some());
            assert!(day.open_avg.is_some());
        }
    }

    #[test]
    fn test_sliding_sum_matches_direct_average() {
        let w = 3;
        let entries: Vec<_> = (1..=12)
            .map(|d| (ymd(2021, 5, d), (d as u64 * 7) % 5, (d as u64 * 3) % 4))
            .collect();
        let store = store_with(&entries);
        let series = calculate_series(&store, window(w));

        for i in (w - 1)..series.len() {
            let trailing = &series[i + 1 - w..=i];
            let created: f64 = trailing.iter().map(|d| d.created as f64).sum::<f64>() / w as f64;
            let closed: f64 = trailing.iter().map(|d| d.closed as f64).sum::<f64>() / w as f64;
            let open: f64 = trailing.iter().map(|d| d.open as f64).sum::<f64>() / w as f64;

            assert!((series[i].created_avg.unwrap() - created).abs() < 1e-9);
            assert!((series[i].closed_avg.unwrap() - closed).abs() < 1e-9);
            assert!((series[i].open_avg.unwrap() - open).abs() < 1e-9);
        }
    }

    #[test]
    fn test_window_of_one_is_the_raw_value() {
        let store = store_with(&[(ymd(2021, 1, 1), 4, 1)]);
        let series = calculate_series(&store, window(1));

        assert_eq!(series[0].created_avg, Some(4.0));
        assert_eq!(series[0].closed_avg, Some(1.0));
        assert_eq!(series[0].open_avg, Some(3.0));
    }

    #[test]
    fn test_history_pinned_at_window_after_warm_up() {
        let mut sliding = SlidingWindow::new(window(3));
        assert_eq!(sliding.len(), 1);

        assert_eq!(sliding.push(3.0), None);
        assert_eq!(sliding.push(3.0), None);
        assert_eq!(sliding.len(), 3);

        for _ in 0..5 {
            assert!(sliding.push(3.0).is_some());
            assert_eq!(sliding.len(), 3);
        }
    }
}
