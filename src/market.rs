//! Market session status and the daily report notice shown on the page.

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::daily_report::{find_report_row, DailyReportRow};

const SESSION_OPEN: (u32, u32) = (8, 0);
const SESSION_CLOSE: (u32, u32) = (16, 30);
const REPORT_HOUR: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub open: bool,
    pub local_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DailyReportNotice {
    Pending { available_at: String },
    NotGenerated,
    Ready { row: DailyReportRow },
}

/// Weekdays, 08:00 through 16:30 inclusive, in the market's own time zone.
pub fn market_status(now: DateTime<Utc>, tz: Tz) -> MarketStatus {
    let local = now.with_timezone(&tz);
    MarketStatus {
        open: is_session_open(local.naive_local()),
        local_time: local.format("%Y-%m-%d %H:%M:%S").to_string(),
        time_zone: tz.name().to_string(),
    }
}

pub fn is_session_open(local: NaiveDateTime) -> bool {
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let time = local.time().with_nanosecond(0).unwrap_or(local.time());
    let open = NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, 0);
    let close = NaiveTime::from_hms_opt(SESSION_CLOSE.0, SESSION_CLOSE.1, 59);
    match (open, close) {
        (Some(open), Some(close)) => time >= open && time <= close,
        _ => false,
    }
}

/// Before 20:00 the report is pending; afterwards today's row is shown when
/// the rollup has written one.
pub fn daily_report_notice(local_now: NaiveDateTime, rows: &[DailyReportRow]) -> DailyReportNotice {
    if local_now.hour() < REPORT_HOUR {
        return DailyReportNotice::Pending {
            available_at: format!("{REPORT_HOUR:02}:00"),
        };
    }
    match find_report_row(rows, local_now.date()) {
        Some(row) => DailyReportNotice::Ready { row: row.clone() },
        None => DailyReportNotice::NotGenerated,
    }
}
