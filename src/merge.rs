//! Left join of an external date-keyed time series with the issues CSV.

use crate::output::ISSUE_HEADERS;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{Read, Write};

/// One row of a previously written issues CSV, kept as the text it was read as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRow {
    pub date: String,
    /// `Created`, `Closed`, `Open`, `Created_Avg`, `Closed_Avg`, `Open_Avg`, in that order.
    pub fields: [String; 6],
}

impl IssueRow {
    /// Value of one of the six issue columns, by header name.
    pub fn field(&self, header: &str) -> Option<&str> {
        let index = ISSUE_HEADERS[1..].iter().position(|h| *h == header)?;
        Some(self.fields[index].as_str())
    }
}

/// Reads an issues CSV into a table keyed by its `Date` column.
///
/// Columns are located by header name. Values are not parsed, so they are
/// copied into the merged file exactly as written.
pub fn load_issues<R: Read>(reader: R) -> Result<HashMap<String, IssueRow>> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv.headers().context("failed to read issues header")?.clone();

    let mut columns = [0usize; 7];
    for (slot, name) in columns.iter_mut().zip(ISSUE_HEADERS) {
        *slot = headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("issues file has no '{name}' column"))?;
    }

    let mut issues = HashMap::new();
    for (line, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("malformed issues row {}", line + 1))?;
        let cell = |i: usize| record.get(columns[i]).unwrap_or_default().to_string();
        let row = IssueRow {
            date: cell(0),
            fields: [cell(1), cell(2), cell(3), cell(4), cell(5), cell(6)],
        };
        issues.insert(row.date.clone(), row);
    }
    Ok(issues)
}

/// Streams `series`, appending the matching issue fields to every row.
///
/// The first column of `series` is the date key. Rows without a match get six
/// empty fields. Returns the number of data rows written.
pub fn merge_series<R: Read, W: Write>(
    series: R,
    issues: &HashMap<String, IssueRow>,
    writer: W,
) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(series);
    let mut out = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    let mut header = reader
        .headers()
        .context("failed to read time series header")?
        .clone();
    header.extend(&ISSUE_HEADERS[1..]);
    out.write_record(&header)
        .context("failed to write merged header")?;

    let mut rows = 0;
    for record in reader.records() {
        let mut record = record.context("malformed time series row")?;
        let fields = record
            .get(0)
            .and_then(|date| issues.get(date))
            .map(|row| row.fields.clone())
            .unwrap_or_default();
        record.extend(&fields);
        out.write_record(&record)
            .context("failed to write merged row")?;
        rows += 1;
    }
    out.flush().context("failed to flush merged CSV")?;

    Ok(rows)
}
