//! Reading and writing the three-row statistics format.
//!
//! Both published files and aggregates hold exactly three lines of
//! comma-separated numbers: time profiles (integers), total counts (reals)
//! and time stdevs (reals). An empty sequence is an empty line.

use crate::error::{CodecError, RowError};
use crate::models::{AggregateRecord, Row};
use csv::{ReaderBuilder, StringRecord, Trim};

/// Decode a record from file content.
///
/// Lines missing from the end of the content are reported as
/// [`RowError::Absent`]. Any non-blank line after the third is an error.
pub fn parse_record(content: &str) -> Result<AggregateRecord, CodecError> {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true).trim(Trim::All);

    // One reader per line: a multi-line reader would silently drop blank
    // rows and shift the ones after them.
    let mut rows = Vec::with_capacity(Row::ALL.len());
    for (i, line) in content.lines().enumerate() {
        if i < Row::ALL.len() {
            rows.push(read_line(&builder, line, i as u64 + 1)?);
        } else if !line.trim().is_empty() {
            return Err(CodecError::ExtraRow { line: i as u64 + 1 });
        }
    }

    let mut rows = rows.into_iter();
    let mut next_row = |row: Row| rows.next().ok_or(RowError::Absent { row });

    let time_profiles = parse_integers(Row::TimeProfiles, next_row(Row::TimeProfiles)?)?;
    let total_counts = parse_reals(Row::TotalCounts, next_row(Row::TotalCounts)?)?;
    let time_stdevs = parse_reals(Row::TimeStdevs, next_row(Row::TimeStdevs)?)?;

    Ok(AggregateRecord::new(time_profiles, total_counts, time_stdevs))
}

/// Read one line as a record; `None` for a blank line.
///
/// A lone `\r` ends a csv record, so a line may still hold several of them.
/// Any non-blank record after the first one is rejected.
fn read_line(
    builder: &ReaderBuilder,
    line: &str,
    number: u64,
) -> Result<Option<StringRecord>, CodecError> {
    let mut reader = builder.from_reader(line.as_bytes());
    let mut record = StringRecord::new();

    if !reader.read_record(&mut record)? {
        return Ok(None);
    }

    let mut rest = StringRecord::new();
    while reader.read_record(&mut rest)? {
        if !is_blank(&rest) {
            return Err(CodecError::SplitRow { line: number });
        }
    }

    if is_blank(&record) {
        Ok(None)
    } else {
        Ok(Some(record))
    }
}

/// Parse an integer row. `None` is a blank row.
pub fn parse_integers(row: Row, record: Option<StringRecord>) -> Result<Vec<i64>, RowError> {
    parse_row(row, record, "an integer", |token| token.parse::<i64>().ok())
}

/// Parse a row of finite reals. `None` is a blank row.
pub fn parse_reals(row: Row, record: Option<StringRecord>) -> Result<Vec<f64>, RowError> {
    parse_row(row, record, "a finite real number", |token| {
        token.parse::<f64>().ok().filter(|v| v.is_finite())
    })
}

fn parse_row<T>(
    row: Row,
    record: Option<StringRecord>,
    expected: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, RowError> {
    let Some(record) = record else {
        return Ok(Vec::new());
    };

    record
        .iter()
        .enumerate()
        .map(|(i, token)| {
            parse(token).ok_or_else(|| RowError::Malformed {
                row,
                field: i + 1,
                token: token.to_string(),
                expected,
            })
        })
        .collect()
}

/// A whitespace-only line comes through as a single empty field.
fn is_blank(record: &StringRecord) -> bool {
    record.len() == 1 && record.get(0).is_some_and(str::is_empty)
}

/// Encode a record as three newline-terminated rows.
pub fn render_record(record: &AggregateRecord) -> String {
    let mut output = String::new();

    output.push_str(&join(record.time_profiles.iter().map(|v| v.to_string())));
    output.push('\n');
    output.push_str(&join(record.total_counts.iter().map(|v| format_real(*v))));
    output.push('\n');
    output.push_str(&join(record.time_stdevs.iter().map(|v| format_real(*v))));
    output.push('\n');

    output
}

fn join(values: impl Iterator<Item = String>) -> String {
    values.collect::<Vec<_>>().join(",")
}

/// Whole values keep a trailing `.0` so the row still reads as reals.
fn format_real(value: f64) -> String {
    format!("{:?}", value)
}
