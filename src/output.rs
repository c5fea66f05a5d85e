//! CSV rendering of the averaged issue series.

use crate::aggregate::date_key;
use crate::metrics::DayRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

/// Column names of the issues CSV, in order.
pub const ISSUE_HEADERS: [&str; 7] = [
    "Date",
    "Created",
    "Closed",
    "Open",
    "Created_Avg",
    "Closed_Avg",
    "Open_Avg",
];

#[derive(Debug, Serialize)]
struct IssueCsvRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Created")]
    created: u64,
    #[serde(rename = "Closed")]
    closed: u64,
    #[serde(rename = "Open")]
    open: i64,
    #[serde(rename = "Created_Avg")]
    created_avg: Option<f64>,
    #[serde(rename = "Closed_Avg")]
    closed_avg: Option<f64>,
    #[serde(rename = "Open_Avg")]
    open_avg: Option<f64>,
}

impl From<&DayRecord> for IssueCsvRecord {
    fn from(day: &DayRecord) -> Self {
        Self {
            date: date_key(day.date),
            created: day.created,
            closed: day.closed,
            open: day.open,
            created_avg: day.created_avg,
            closed_avg: day.closed_avg,
            open_avg: day.open_avg,
        }
    }
}

/// Writes the header and one row per day. Absent averages become empty fields.
///
/// Nothing is written for an empty series. Returns the number of data rows.
pub fn write_series<W: Write>(writer: W, series: &[DayRecord]) -> Result<usize> {
    if series.is_empty() {
        tracing::info!("No issues logged, nothing to output.");
        return Ok(0);
    }

    let mut csv = csv::Writer::from_writer(writer);
    for day in series {
        csv.serialize(IssueCsvRecord::from(day))
            .with_context(|| format!("failed to write row for {}", date_key(day.date)))?;
    }
    csv.flush().context("failed to flush issues CSV")?;

    Ok(series.len())
}
