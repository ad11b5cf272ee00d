//! Date-range and most-recent-N window selection.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::observations::{parse_timestamp, Observation};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    /// `None` keeps every row that passes the date filter.
    pub max_points: Option<usize>,
}

impl WindowRequest {
    pub fn between(start: NaiveDate, end: NaiveDate, max_points: Option<usize>) -> Self {
        Self {
            start: Some(start.format("%Y-%m-%d").to_string()),
            end: Some(end.format("%Y-%m-%d").to_string()),
            max_points,
        }
    }

    /// Inclusive timestamp bounds, or `None` when either side is absent or
    /// unparseable. A bad date disables the filter instead of failing the
    /// refresh.
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = parse_filter_date(self.start.as_deref()?)?;
        let end = parse_filter_date(self.end.as_deref()?)?;
        Some((
            start.and_hms_opt(0, 0, 0)?,
            end.and_hms_micro_opt(23, 59, 59, 999_999)?,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}

/// Accepts a bare date or any timestamp shape the loader understands; only
/// the calendar date is kept.
pub fn parse_filter_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.date()))
}

pub fn select_window(rows: &[Observation], req: &WindowRequest) -> Vec<Observation> {
    let mut selected: Vec<Observation> = match req.bounds() {
        Some((start, end)) => rows
            .iter()
            .filter(|row| row.timestamp >= start && row.timestamp <= end)
            .cloned()
            .collect(),
        None => rows.to_vec(),
    };

    selected.sort_by_key(|row| row.timestamp);

    if let Some(max_points) = req.max_points {
        if selected.len() > max_points {
            selected.drain(..selected.len() - max_points);
        }
    }

    selected
}

pub fn date_bounds(rows: &[Observation]) -> Option<DateBounds> {
    let min = rows.iter().map(|row| row.timestamp).min()?;
    let max = rows.iter().map(|row| row.timestamp).max()?;
    Some(DateBounds {
        min_date: min.date(),
        max_date: max.date(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32, price: f64) -> Observation {
        let ts = NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap();
        Observation::new(ts, price)
    }

    fn sample() -> Vec<Observation> {
        vec![
            at(1, 9, 100.0),
            at(1, 23, 101.0),
            at(2, 0, 102.0),
            at(2, 12, 103.0),
            at(3, 10, 104.0),
        ]
    }

    fn req(start: &str, end: &str, max_points: Option<usize>) -> WindowRequest {
        WindowRequest {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            max_points,
        }
    }

    #[test]
    fn end_date_is_inclusive_through_end_of_day() {
        let window = select_window(&sample(), &req("2024-03-01", "2024-03-01", None));
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].price, 101.0);
    }

    #[test]
    fn range_outside_data_span_is_empty() {
        let window = select_window(&sample(), &req("2023-01-01", "2023-12-31", None));
        assert!(window.is_empty());
    }

    #[test]
    fn range_covering_span_keeps_everything() {
        let window = select_window(&sample(), &req("2024-02-01", "2024-04-01", None));
        assert_eq!(window, sample());
    }

    #[test]
    fn truncation_keeps_most_recent_points() {
        let rows = sample();
        let window = select_window(&rows, &req("2024-03-01", "2024-03-03", Some(3)));
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].timestamp, rows[rows.len() - 3].timestamp);
    }

    #[test]
    fn malformed_or_missing_dates_disable_the_filter() {
        let rows = sample();
        assert_eq!(select_window(&rows, &req("not-a-date", "2024-03-01", None)).len(), 5);

        let open_ended = WindowRequest {
            start: Some("2024-03-02".to_string()),
            end: None,
            max_points: Some(2),
        };
        let window = select_window(&rows, &open_ended);
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].price, 104.0);
    }

    #[test]
    fn unsorted_input_is_ordered_before_truncation() {
        let mut rows = sample();
        rows.reverse();
        let window = select_window(&rows, &WindowRequest {
            max_points: Some(1),
            ..WindowRequest::default()
        });
        assert_eq!(window[0].price, 104.0);
    }

    #[test]
    fn filter_dates_accept_datetime_strings() {
        assert_eq!(
            parse_filter_date("2024-03-02T15:30:00"),
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
    }

    #[test]
    fn date_bounds_cover_first_and_last_day() {
        let bounds = date_bounds(&sample()).unwrap();
        assert_eq!(bounds.min_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(bounds.max_date, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert!(date_bounds(&[]).is_none());
    }
}
