//! Daily open/close/high/low rollup and the persisted report table.
//!
//! The report file is rewritten in full on every run. There is no locking
//! between the rollup, the external ingester and dashboard readers; a run
//! that overlaps another writer can lose that writer's update.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::observations::{load_observations, Observation, ObservationLoadError};
use crate::stats::relative_change_pct;

pub const REPORT_HEADERS: [&str; 7] = [
    "date",
    "open",
    "close",
    "high",
    "low",
    "volatility",
    "evolution_%",
];

pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReportRow {
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volatility: f64,
    #[serde(rename = "evolution_%")]
    pub evolution_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RollupOutcome {
    Written {
        row: DailyReportRow,
        total_rows: usize,
    },
    NoDataForDate {
        date: NaiveDate,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid report path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Error)]
pub enum RollupError {
    #[error("failed to read observations: {0}")]
    Observations(#[from] ObservationLoadError),
    #[error("failed to write daily report: {0}")]
    Report(#[from] ReportError),
}

/// Summarizes the observations falling on `date`, or `None` when there are
/// none.
pub fn summarize_day(rows: &[Observation], date: NaiveDate) -> Option<DailyReportRow> {
    let mut day: Vec<&Observation> = rows
        .iter()
        .filter(|row| row.timestamp.date() == date)
        .collect();
    if day.is_empty() {
        return None;
    }
    day.sort_by_key(|row| row.timestamp);

    let open = day.first()?.price;
    let close = day.last()?.price;
    let high = extreme(&day, |row| row.high, f64::max);
    let low = extreme(&day, |row| row.low, f64::min);

    Some(DailyReportRow {
        date: date.format(REPORT_DATE_FORMAT).to_string(),
        open,
        close,
        high,
        low,
        volatility: high - low,
        evolution_pct: relative_change_pct(open, close),
    })
}

/// Replaces any row with the same date, then appends.
pub fn upsert_report_row(table: &mut Vec<DailyReportRow>, row: DailyReportRow) {
    table.retain(|existing| existing.date != row.date);
    table.push(row);
}

pub fn read_report(path: &Path) -> Result<Vec<DailyReportRow>, ReportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// A missing file is an empty table; an unreadable one is logged and also
/// treated as empty.
pub fn read_report_or_empty(path: &Path) -> Vec<DailyReportRow> {
    if !path.exists() {
        return Vec::new();
    }
    match read_report(path) {
        Ok(rows) => rows,
        Err(err) => {
            warn!(
                component = "daily_report",
                event = "report.read.failed",
                path = %path.display(),
                error = %err
            );
            Vec::new()
        }
    }
}

pub fn write_report(path: &Path, rows: &[DailyReportRow]) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(REPORT_HEADERS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ReportError::Io(err.into_error()))?;
    write_atomic(path, &bytes)
}

pub fn find_report_row(rows: &[DailyReportRow], date: NaiveDate) -> Option<&DailyReportRow> {
    let key = date.format(REPORT_DATE_FORMAT).to_string();
    rows.iter().rev().find(|row| row.date == key)
}

/// Reads the observation file, summarizes `today` and upserts the result
/// into the report file. Observation read failures are returned to the
/// caller; report read failures start from an empty table.
pub fn run_daily_rollup(
    data_path: &Path,
    report_path: &Path,
    time_aliases: &[String],
    today: NaiveDate,
) -> Result<RollupOutcome, RollupError> {
    let loaded = load_observations(data_path, time_aliases)?;

    let Some(row) = summarize_day(&loaded.rows, today) else {
        info!(
            component = "daily_report",
            event = "rollup.no_data",
            date = %today
        );
        return Ok(RollupOutcome::NoDataForDate { date: today });
    };

    let mut table = read_report_or_empty(report_path);
    upsert_report_row(&mut table, row.clone());
    write_report(report_path, &table)?;

    info!(
        component = "daily_report",
        event = "rollup.written",
        date = %row.date,
        open = row.open,
        close = row.close,
        evolution_pct = row.evolution_pct,
        total_rows = table.len()
    );

    Ok(RollupOutcome::Written {
        row,
        total_rows: table.len(),
    })
}

fn extreme(
    day: &[&Observation],
    column: impl Fn(&Observation) -> Option<f64>,
    pick: fn(f64, f64) -> f64,
) -> f64 {
    let from_column = day
        .iter()
        .filter_map(|row| column(*row))
        .reduce(pick);
    // Files without high/low columns fall back to the traded price.
    from_column.unwrap_or_else(|| {
        day.iter()
            .map(|row| row.price)
            .reduce(pick)
            .unwrap_or_default()
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ReportError::InvalidPath(path.display().to_string()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
