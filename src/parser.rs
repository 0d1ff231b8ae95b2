//! Weekly timesheet parser.
//!
//! The pasted text is a spreadsheet copied as tab-separated rows:
//!
//! - row 0: header, columns 4..=10 hold the seven day labels as `D/M/YYYY`
//! - row 1: ignored
//! - row 2..: `category \t task id \t description \t <unused> \t h1 .. h7`
//!
//! Rows with an empty category cell are separators and produce nothing. The
//! category is kept verbatim, whitespace included; it must match an activity
//! name exactly. Empty hour cells and zero hours produce nothing. Anything else
//! that does not parse fails the whole import.
use chrono::NaiveDate;

use crate::error::ImportError;
use crate::model::{DraftEntry, Existence};

pub const FIRST_DAY_COLUMN: usize = 4;
pub const DAYS_PER_WEEK: usize = 7;
pub const FIRST_TASK_ROW: usize = 2;

pub fn parse(raw: &str) -> Result<Vec<DraftEntry>, ImportError> {
    let table: Vec<Vec<&str>> = raw.lines().map(|line| line.split('\t').collect()).collect();

    let header = table
        .first()
        .ok_or_else(|| ImportError::parse(1, "input is empty"))?;
    let days = parse_header(header)?;

    let mut entries = Vec::new();
    for (idx, row) in table.iter().enumerate().skip(FIRST_TASK_ROW) {
        let line = idx + 1;
        let category = cell(row, 0);
        if category.is_empty() {
            continue;
        }
        let task_id = parse_task_id(cell(row, 1), line)?;
        let description = cell(row, 2);

        for (offset, date) in days.iter().enumerate() {
            let hours = parse_hours(cell(row, FIRST_DAY_COLUMN + offset), line)?;
            if hours == 0.0 {
                continue;
            }
            entries.push(DraftEntry {
                category: category.to_string(),
                task_id,
                description: description.to_string(),
                hours,
                date: *date,
                existence: Existence::Unknown,
            });
        }
    }
    Ok(entries)
}

/// Cells past the end of a short row read as empty.
fn cell<'a>(row: &[&'a str], idx: usize) -> &'a str {
    row.get(idx).copied().unwrap_or("")
}

fn parse_header(header: &[&str]) -> Result<Vec<NaiveDate>, ImportError> {
    (0..DAYS_PER_WEEK)
        .map(|offset| {
            let column = FIRST_DAY_COLUMN + offset;
            let label = header.get(column).ok_or_else(|| {
                ImportError::parse(1, format!("missing day label in column {}", column + 1))
            })?;
            parse_day_label(label)
                .ok_or_else(|| ImportError::parse(1, format!("invalid day label '{}'", label)))
        })
        .collect()
}

/// `D/M/YYYY` or `DD/MM/YYYY` to a calendar date.
pub fn parse_day_label(label: &str) -> Option<NaiveDate> {
    let mut parts = label.trim().split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let short_number = |s: &str| (1..=2).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit());
    if !short_number(day) || !short_number(month) {
        return None;
    }
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// `D/M/YYYY` to `YYYY-MM-DD`.
pub fn normalize_day_label(label: &str) -> Option<String> {
    parse_day_label(label).map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_task_id(raw: &str, line: usize) -> Result<Option<u64>, ImportError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(ImportError::parse(line, format!("invalid task id '{}'", raw))),
    }
}

fn parse_hours(raw: &str, line: usize) -> Result<f64, ImportError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    // Spreadsheets in D/M/YYYY locales copy decimals with a comma.
    let hours: f64 = raw
        .replace(',', ".")
        .parse()
        .map_err(|_| ImportError::parse(line, format!("invalid hours '{}'", raw)))?;
    if !hours.is_finite() || hours < 0.0 {
        return Err(ImportError::parse(line, format!("invalid hours '{}'", raw)));
    }
    Ok(hours)
}
