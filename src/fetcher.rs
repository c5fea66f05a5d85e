use crate::aggregate::{Aggregator, DateBucketStore, RunSummary};
use crate::config::{create_output, IssuesConfig, MergeConfig};
use crate::github::{Clock, FetchError, IssuePaginator, Transport};
use crate::merge;
use crate::metrics;
use crate::output;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::num::NonZeroUsize;

/// Drains the paginator into date buckets and run counters.
///
/// The first failing page aborts the whole collection.
pub fn collect_issues<T, C>(
    pages: IssuePaginator<T, C>,
) -> Result<(DateBucketStore, RunSummary), FetchError>
where
    T: Transport,
    C: Clock,
{
    let mut aggregator = Aggregator::new();
    for page in pages {
        aggregator.ingest_page(&page?);
    }
    Ok(aggregator.finish())
}

/// Averages the buckets and writes the issues CSV. Returns the number of rows written.
pub fn write_report<W: Write>(
    store: &DateBucketStore,
    window: NonZeroUsize,
    writer: W,
) -> Result<usize> {
    let series = metrics::calculate_series(store, window);
    output::write_series(writer, &series)
}

/// Fetches, aggregates and writes in one pass, returning the run counters.
pub fn fetch_and_report<T, C, W>(
    pages: IssuePaginator<T, C>,
    window: NonZeroUsize,
    writer: W,
) -> Result<RunSummary>
where
    T: Transport,
    C: Clock,
    W: Write,
{
    let (store, summary) = collect_issues(pages).context("failed to fetch issues")?;
    let rows = write_report(&store, window, writer)?;
    tracing::debug!(rows, buckets = store.len(), "Issues report written");
    log_summary(&summary);
    Ok(summary)
}

/// Runs the issues path against the live API.
///
/// The output file is created before the first request so a bad path fails fast.
pub fn run_issues(config: &IssuesConfig) -> Result<RunSummary> {
    tracing::info!(repo = %config.repo, out = %config.out_path.display(), "Collecting issues");
    let file = config.open_output()?;
    let pages = IssuePaginator::from_config(config)?;
    fetch_and_report(pages, config.window, BufWriter::new(file))
}

/// Runs the merge path, returning the number of merged rows.
pub fn run_merge(config: &MergeConfig) -> Result<usize> {
    let issues_file = File::open(&config.issues_path)
        .with_context(|| format!("failed to open issues file {}", config.issues_path.display()))?;
    let issues = merge::load_issues(BufReader::new(issues_file))?;

    let series_file = File::open(&config.series_path)
        .with_context(|| format!("failed to open time series {}", config.series_path.display()))?;
    let merged_file = create_output(&config.merged_path)?;

    let rows = merge::merge_series(
        BufReader::new(series_file),
        &issues,
        BufWriter::new(merged_file),
    )?;
    tracing::info!(path = %config.merged_path.display(), rows, "Generated merged file");
    Ok(rows)
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        total_items = summary.total_items,
        total_issues = summary.total_issues,
        open_issues = summary.open_issues,
        closed_issues = summary.closed_issues,
        pull_requests = summary.pull_requests,
        "Run summary"
    );
}
