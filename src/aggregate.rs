//! Per-day counting of created and closed issues.

use crate::types::{Issue, IssueState};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Format of the date key used in buckets and CSV files.
pub const DATE_KEY_FORMAT: &str = "%Y%m%d";

/// Counts recorded for a single calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCounts {
    pub created: u64,
    pub closed: u64,
}

/// Date-ordered buckets of [`DayCounts`].
#[derive(Debug, Clone, Default)]
pub struct DateBucketStore {
    buckets: BTreeMap<NaiveDate, DayCounts>,
}

impl DateBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket for `date`, inserting a zeroed one on first access.
    pub fn get_or_insert_default(&mut self, date: NaiveDate) -> &mut DayCounts {
        self.buckets.entry(date).or_default()
    }

    /// Counts for `date`, zero when nothing was recorded.
    pub fn get(&self, date: NaiveDate) -> DayCounts {
        self.buckets.get(&date).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Earliest and latest dates present.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = *self.buckets.keys().next()?;
        let last = *self.buckets.keys().next_back()?;
        Some((first, last))
    }
}

/// Run-wide counters over every item seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_items: u64,
    pub total_issues: u64,
    pub open_issues: u64,
    pub closed_issues: u64,
    pub pull_requests: u64,
}

impl RunSummary {
    fn finalize(&mut self) {
        self.closed_issues = self.total_issues - self.open_issues;
    }
}

/// Converts an ISO-8601 timestamp to its calendar date, ignoring time and offset.
///
/// `"2021-01-05T23:59:59-08:00"` becomes 2021-01-05.
pub fn date_of(timestamp: &str) -> Option<NaiveDate> {
    let key = [timestamp.get(0..4)?, timestamp.get(5..7)?, timestamp.get(8..10)?].concat();
    NaiveDate::parse_from_str(&key, DATE_KEY_FORMAT).ok()
}

/// Formats a date as the 8-digit `YYYYMMDD` key.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Folds pages of issues into a [`DateBucketStore`] and a [`RunSummary`].
#[derive(Debug, Default)]
pub struct Aggregator {
    store: DateBucketStore,
    summary: RunSummary,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest_page(&mut self, page: &[Issue]) {
        for issue in page {
            self.ingest(issue);
        }
    }

    fn ingest(&mut self, issue: &Issue) {
        self.summary.total_items += 1;

        if issue.is_pull_request {
            self.summary.pull_requests += 1;
            return;
        }

        self.summary.total_issues += 1;
        self.summary.open_issues += 1;

        // Without a creation bucket, a closed bucket would pull the open series down.
        let Some(created) = date_of(&issue.created_at) else {
            tracing::warn!(
                issue = ?issue.number,
                created_at = %issue.created_at,
                "Issue has an unreadable creation date, skipping its created and closed buckets"
            );
            return;
        };
        self.store.get_or_insert_default(created).created += 1;

        if issue.state != IssueState::Closed {
            return;
        }

        match issue.closed_at.as_deref().and_then(date_of) {
            Some(date) => {
                self.store.get_or_insert_default(date).closed += 1;
                self.summary.open_issues -= 1;
            }
            None => tracing::warn!(
                issue = ?issue.number,
                closed_at = ?issue.closed_at,
                "Issue state is 'closed', but no close date is specified - skipping"
            ),
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Finalizes the summary and hands back both structures.
    pub fn finish(mut self) -> (DateBucketStore, RunSummary) {
        self.summary.finalize();
        (self.store, self.summary)
    }
}
