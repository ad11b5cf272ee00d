//! Price observation CSV loading.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Column order assumed when the file carries no usable header row.
pub const FALLBACK_COLUMNS: [&str; 6] = [
    "timestamp",
    "price",
    "percentchange",
    "netchange",
    "high",
    "low",
];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Cell values exporters write for "no value", compared case-insensitively.
const MISSING_MARKERS: [&str; 6] = ["na", "n/a", "#n/a", "nan", "null", "none"];

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub percent_change: Option<f64>,
    pub net_change: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: NaiveDateTime, price: f64) -> Self {
        Self {
            timestamp,
            price,
            percent_change: None,
            net_change: None,
            high: None,
            low: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    Named,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedObservations {
    pub rows: Vec<Observation>,
    pub header_mode: HeaderMode,
    pub skipped_rows: usize,
    pub fingerprint: String,
}

#[derive(Debug, Error)]
pub enum ObservationLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("observation file has no records")]
    Empty,
    #[error("record on line {line} has {found} columns, expected at least {expected}")]
    InvalidRecordColumns {
        line: usize,
        found: usize,
        expected: usize,
    },
    #[error("failed to parse {field} value '{value}' on line {line}")]
    ParseField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndexes {
    timestamp: usize,
    price: usize,
    percent_change: Option<usize>,
    net_change: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
}

impl ColumnIndexes {
    fn fallback() -> Self {
        Self {
            timestamp: 0,
            price: 1,
            percent_change: Some(2),
            net_change: Some(3),
            high: Some(4),
            low: Some(5),
        }
    }

    fn required_len(&self) -> usize {
        self.timestamp.max(self.price) + 1
    }
}

/// Reads the observation file and returns its rows sorted by timestamp.
pub fn load_observations(
    path: &Path,
    time_aliases: &[String],
) -> Result<LoadedObservations, ObservationLoadError> {
    let bytes = fs::read(path)?;
    let loaded = parse_observations(&bytes, time_aliases)?;

    debug!(
        component = "observations",
        event = "observations.load.finish",
        path = %path.display(),
        rows = loaded.rows.len(),
        skipped_rows = loaded.skipped_rows,
        header_mode = ?loaded.header_mode
    );

    Ok(loaded)
}

pub fn parse_observations(
    bytes: &[u8],
    time_aliases: &[String],
) -> Result<LoadedObservations, ObservationLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }

    let Some(first) = records.first() else {
        return Err(ObservationLoadError::Empty);
    };

    let (columns, header_mode, data_start) = match named_columns(first, time_aliases) {
        Some(columns) => (columns, HeaderMode::Named, 1),
        None => (ColumnIndexes::fallback(), HeaderMode::Fallback, 0),
    };

    let mut rows = Vec::with_capacity(records.len().saturating_sub(data_start));
    let mut skipped_rows = 0usize;
    for (idx, record) in records.iter().enumerate().skip(data_start) {
        match parse_record(record, &columns, idx + 1)? {
            Some(row) => rows.push(row),
            None => skipped_rows += 1,
        }
    }

    rows.sort_by_key(|row| row.timestamp);

    Ok(LoadedObservations {
        rows,
        header_mode,
        skipped_rows,
        fingerprint: fingerprint_bytes(bytes),
    })
}

/// Accepts the date-time shapes found in exported price files, plus bare dates
/// (midnight) and RFC 3339 stamps (converted to UTC wall time).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn normalize_column_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn named_columns(header: &StringRecord, time_aliases: &[String]) -> Option<ColumnIndexes> {
    let map: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_column_name(name), idx))
        .collect();

    let timestamp = time_aliases
        .iter()
        .find_map(|alias| map.get(&normalize_column_name(alias)).copied())?;
    let price = *map.get("price")?;

    Some(ColumnIndexes {
        timestamp,
        price,
        percent_change: map.get("percentchange").copied(),
        net_change: map.get("netchange").copied(),
        high: map.get("high").copied(),
        low: map.get("low").copied(),
    })
}

fn parse_record(
    record: &StringRecord,
    columns: &ColumnIndexes,
    line: usize,
) -> Result<Option<Observation>, ObservationLoadError> {
    if record.len() < columns.required_len() {
        return Err(ObservationLoadError::InvalidRecordColumns {
            line,
            found: record.len(),
            expected: columns.required_len(),
        });
    }

    let raw_ts = record.get(columns.timestamp).unwrap_or_default();
    let raw_price = record.get(columns.price).unwrap_or_default();
    // Rows still being written by the ingester can carry blank cells.
    if is_missing_cell(raw_ts) || is_missing_cell(raw_price) {
        return Ok(None);
    }

    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| ObservationLoadError::ParseField {
        line,
        field: "timestamp",
        value: raw_ts.to_string(),
    })?;

    let price = parse_f64(raw_price, "price", line)?;
    if !price.is_finite() {
        return Ok(None);
    }

    Ok(Some(Observation {
        timestamp,
        price,
        percent_change: parse_optional_f64(record, columns.percent_change, "percentchange", line)?,
        net_change: parse_optional_f64(record, columns.net_change, "netchange", line)?,
        high: parse_optional_f64(record, columns.high, "high", line)?,
        low: parse_optional_f64(record, columns.low, "low", line)?,
    }))
}

fn parse_f64(raw: &str, field: &'static str, line: usize) -> Result<f64, ObservationLoadError> {
    raw.parse::<f64>()
        .map_err(|_| ObservationLoadError::ParseField {
            line,
            field,
            value: raw.to_string(),
        })
}

fn parse_optional_f64(
    record: &StringRecord,
    idx: Option<usize>,
    field: &'static str,
    line: usize,
) -> Result<Option<f64>, ObservationLoadError> {
    let Some(raw) = idx.and_then(|idx| record.get(idx)) else {
        return Ok(None);
    };
    if is_missing_cell(raw) {
        return Ok(None);
    }
    parse_f64(raw, field, line).map(|value| value.is_finite().then_some(value))
}

fn is_missing_cell(raw: &str) -> bool {
    raw.is_empty()
        || MISSING_MARKERS
            .iter()
            .any(|marker| raw.eq_ignore_ascii_case(marker))
}
