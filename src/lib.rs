//! Live price dashboard core.
//!
//! - observation CSV loading with header normalization and a fixed fallback layout
//! - date-range / most-recent-N window selection
//! - descriptive statistics, return histogram and gauge reading
//! - daily open/close/high/low rollup persisted to a report CSV
//! - axum routes serving the dashboard page and JSON snapshots

mod config;
mod daily_report;
mod dashboard;
mod market;
mod observability;
mod observations;
mod refresh;
mod stats;
mod window;

pub use config::{
    parse_gauge_mode, parse_locale, parse_points, parse_refresh_interval, parse_time_zone,
    ConfigError, DashboardConfig, Locale, LocaleLabels, DEFAULT_POINTS,
    DEFAULT_REFRESH_INTERVAL_MS, MAX_REFRESH_INTERVAL_MS,
};
pub use daily_report::{
    find_report_row, read_report, read_report_or_empty, run_daily_rollup, summarize_day,
    upsert_report_row, write_report, DailyReportRow, ReportError, RollupError, RollupOutcome,
    REPORT_DATE_FORMAT, REPORT_HEADERS,
};
pub use dashboard::{
    dashboard_router, render_dashboard_html, render_download_csv, resolve_refresh,
    DashboardQuery, SnapshotResponse, DOWNLOAD_FILE_NAME, TABLE_COLUMN_KEYS,
};
pub use market::{
    daily_report_notice, is_session_open, market_status, DailyReportNotice, MarketStatus,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_source_selected, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use observations::{
    fingerprint_bytes, load_observations, normalize_column_name, parse_observations,
    parse_timestamp, HeaderMode, LoadedObservations, Observation, ObservationLoadError,
    FALLBACK_COLUMNS,
};
pub use refresh::{
    build_snapshot, default_window, refresh_snapshot, CsvSnapshotSource, DashboardSnapshot,
    RefreshFailure, RefreshOutcome, SnapshotSource, TableRow,
};
pub use stats::{
    histogram, percent_changes, relative_change_pct, GaugeMode, GaugeReading, HistogramBin,
    PriceStats, DEFAULT_HISTOGRAM_BINS,
};
pub use window::{date_bounds, parse_filter_date, select_window, DateBounds, WindowRequest};
