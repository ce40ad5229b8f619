use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

use crate::error::{ReportError, Result};

/// Column holding the inspection date
pub const DATE_COLUMN: &str = "Date";

lazy_static! {
    static ref SHEET_ID: Regex = Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap();
}

/// Cell contents that a CSV export treats as "no value".
const NA_MARKERS: [&str; 19] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null", "",
];

/// Resolve a pasted spreadsheet URL (or a bare ID) to the spreadsheet ID
///
/// # Examples
/// ```
/// use night_checks::sheet::extract_sheet_id;
///
/// let url = "https://docs.google.com/spreadsheets/d/1AbC-x_9/edit#gid=0";
/// assert_eq!(extract_sheet_id(url), "1AbC-x_9");
/// assert_eq!(extract_sheet_id("  1AbC-x_9 "), "1AbC-x_9");
/// ```
pub fn extract_sheet_id(sheet_input: &str) -> String {
    match SHEET_ID.captures(sheet_input) {
        Some(caps) => caps[1].to_string(),
        None => sheet_input.trim().to_string(),
    }
}

/// Parse the `YYYY-MM-DD` date the operator submits
pub fn parse_target_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|_| ReportError::InvalidDate)
}

const DATETIME_FORMATS: [&str; 12] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 11] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
];

/// Parse a free-form `Date` cell
///
/// ISO forms are tried first, then slash and dash forms month-first with a
/// day-first fallback, then spelled-out month names. Anything else is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// A single scalar taken from the sheet.
///
/// The raw text is kept for both variants so leading zeros and the exact
/// spelling of a number survive into the rendered document.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(String),
}

impl CellValue {
    /// Classify a raw CSV field; NA markers and blanks are `None`
    pub fn parse(raw: &str) -> Option<CellValue> {
        if NA_MARKERS.contains(&raw) || raw.trim().is_empty() {
            return None;
        }

        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(CellValue::Number(trimmed.to_string())),
            _ => Some(CellValue::Text(raw.to_string())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            CellValue::Number(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(raw) => f.write_str(raw),
        }
    }
}

/// One inspection record: column name to value, plus the parsed `Date` once filtering has run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: HashMap<String, CellValue>,
    parsed_date: Option<NaiveDateTime>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by the CSV reader and by tests
    pub fn with(mut self, column: &str, raw: &str) -> Self {
        self.insert(column, raw);
        self
    }

    /// Store a raw field; blanks and NA markers leave the column absent
    pub fn insert(&mut self, column: impl Into<String>, raw: &str) {
        let column = column.into();
        match CellValue::parse(raw) {
            Some(value) => {
                self.cells.insert(column, value);
            }
            None => {
                self.cells.remove(&column);
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// Text of `column`, or `default` when the column is absent or empty
    pub fn text_or(&self, column: &str, default: &str) -> String {
        self.get(column)
            .map(|value| value.to_string())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn parsed_date(&self) -> Option<NaiveDateTime> {
        self.parsed_date
    }

    pub fn set_parsed_date(&mut self, parsed: Option<NaiveDateTime>) {
        self.parsed_date = parsed;
    }
}

/// Rows of a fetched sheet in source order, with the header row's column names.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Sheet {
    /// Parse a CSV export
    ///
    /// The first record is the header. Blank header cells become `Unnamed: <i>`
    /// and repeated names get a `.1`, `.2`, ... suffix so no column is lost.
    /// Short records leave the missing columns absent; extra fields are dropped.
    ///
    /// # Errors
    /// * `ReportError::Fetch` if the body is empty, looks like HTML or is not valid CSV
    pub fn from_csv(bytes: &[u8]) -> Result<Sheet> {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        if head.is_empty() {
            return Err(ReportError::Fetch("No columns to parse from file".to_string()));
        }
        if head.starts_with('<') {
            return Err(ReportError::Fetch(
                "the sheet returned an HTML page instead of CSV; is it shared publicly?".to_string(),
            ));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let raw_headers = reader
            .headers()
            .map_err(|e| ReportError::Fetch(e.to_string()))?
            .clone();
        let headers = dedupe_headers(raw_headers.iter());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ReportError::Fetch(e.to_string()))?;
            let mut row = Row::new();
            for (column, field) in headers.iter().zip(record.iter()) {
                row.insert(column.as_str(), field);
            }
            rows.push(row);
        }

        Ok(Sheet { headers, rows })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }

    /// Parse every row's `Date` and keep the rows falling on `target`
    ///
    /// Time of day is ignored. Rows whose date cannot be parsed never match.
    ///
    /// # Errors
    /// * `ReportError::MissingColumn` if the sheet has no `Date` column
    pub fn into_rows_for_date(self, target: NaiveDate) -> Result<Vec<Row>> {
        if !self.has_column(DATE_COLUMN) {
            return Err(ReportError::MissingColumn(DATE_COLUMN));
        }

        Ok(self
            .rows
            .into_iter()
            .filter_map(|mut row| {
                let parsed = row
                    .get(DATE_COLUMN)
                    .and_then(|value| parse_date(&value.to_string()));
                row.set_parsed_date(parsed);
                (parsed.map(|p| p.date()) == Some(target)).then_some(row)
            })
            .collect())
    }
}

fn dedupe_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::new();

    for (i, name) in raw.enumerate() {
        let name = if i == 0 {
            name.trim_start_matches('\u{feff}')
        } else {
            name
        };
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name.to_string()
        };

        let header = match seen.get(&base).copied() {
            Some(count) => format!("{}.{}", base, count),
            None => base.clone(),
        };
        *seen.entry(base).or_insert(0) += 1;
        headers.push(header);
    }

    headers
}
