//! One read-compute cycle: load observations, select the window, compute
//! statistics, and package everything the dashboard renders.

use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DashboardConfig, MAX_REFRESH_INTERVAL_MS};
use crate::daily_report::read_report_or_empty;
use crate::market::{daily_report_notice, market_status, DailyReportNotice, MarketStatus};
use crate::observations::{load_observations, Observation, ObservationLoadError};
use crate::stats::{histogram, percent_changes, GaugeReading, HistogramBin, PriceStats};
use crate::window::{date_bounds, select_window, DateBounds, WindowRequest};

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub percentchange: Option<f64>,
    pub netchange: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl From<&Observation> for TableRow {
    fn from(row: &Observation) -> Self {
        Self {
            timestamp: row.timestamp,
            price: row.price,
            percentchange: row.percent_change,
            netchange: row.net_change,
            high: row.high,
            low: row.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub window: WindowRequest,
    pub stats: PriceStats,
    pub gauge: GaugeReading,
    pub returns: Vec<f64>,
    pub histogram: Vec<HistogramBin>,
    pub rows: Vec<TableRow>,
    pub date_bounds: Option<DateBounds>,
    pub source_fingerprint: String,
    pub market: MarketStatus,
    pub daily_report: DailyReportNotice,
    pub generated_at: String,
    pub next_refresh_at: Option<String>,
}

/// Why a refresh left the previous snapshot in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailure {
    Io,
    Parse,
    Empty,
}

impl RefreshFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Empty => "empty",
        }
    }
}

impl From<&ObservationLoadError> for RefreshFailure {
    fn from(err: &ObservationLoadError) -> Self {
        match err {
            ObservationLoadError::Io(_) => Self::Io,
            ObservationLoadError::Csv(inner) if inner.is_io_error() => Self::Io,
            ObservationLoadError::Empty => Self::Empty,
            ObservationLoadError::Csv(_)
            | ObservationLoadError::InvalidRecordColumns { .. }
            | ObservationLoadError::ParseField { .. } => Self::Parse,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Fresh(Box<DashboardSnapshot>),
    Unchanged {
        reason: RefreshFailure,
        detail: String,
    },
}

/// Runs a full cycle against the configured files. Never fails: load errors
/// come back as `Unchanged` so the caller keeps what it already shows.
pub fn refresh_snapshot(
    cfg: &DashboardConfig,
    req: &WindowRequest,
    now: DateTime<Utc>,
) -> RefreshOutcome {
    let loaded = match load_observations(&cfg.data_path, &cfg.time_columns) {
        Ok(loaded) => loaded,
        Err(err) => {
            let reason = RefreshFailure::from(&err);
            warn!(
                component = "refresh",
                event = "dashboard.refresh.unchanged",
                reason = reason.as_str(),
                path = %cfg.data_path.display(),
                error = %err
            );
            return RefreshOutcome::Unchanged {
                reason,
                detail: err.to_string(),
            };
        }
    };

    let report_rows = read_report_or_empty(&cfg.report_path);
    let local_now = now.with_timezone(&Local).naive_local();
    let window = select_window(&loaded.rows, req);

    let snapshot = build_snapshot(
        cfg,
        req,
        &loaded.rows,
        &window,
        loaded.fingerprint,
        market_status(now, cfg.market_tz),
        daily_report_notice(local_now, &report_rows),
        now,
    );

    debug!(
        component = "refresh",
        event = "dashboard.refresh.fresh",
        window_rows = snapshot.rows.len(),
        total_rows = loaded.rows.len()
    );

    RefreshOutcome::Fresh(Box::new(snapshot))
}

#[allow(clippy::too_many_arguments)]
pub fn build_snapshot(
    cfg: &DashboardConfig,
    req: &WindowRequest,
    all_rows: &[Observation],
    window: &[Observation],
    source_fingerprint: String,
    market: MarketStatus,
    daily_report: DailyReportNotice,
    now: DateTime<Utc>,
) -> DashboardSnapshot {
    let prices: Vec<f64> = window.iter().map(|row| row.price).collect();
    let stats = PriceStats::compute(&prices);
    let returns = percent_changes(&prices);
    let local_now = now.with_timezone(&Local);
    let next_refresh_at = cfg
        .auto_refresh
        .then(|| next_refresh_time(local_now, cfg.refresh_interval_ms))
        .flatten();

    DashboardSnapshot {
        window: req.clone(),
        stats,
        gauge: GaugeReading::from_stats(&stats, cfg.gauge_mode),
        histogram: histogram(&returns, cfg.histogram_bins),
        returns,
        rows: window.iter().map(TableRow::from).collect(),
        date_bounds: date_bounds(all_rows),
        source_fingerprint,
        market,
        daily_report,
        generated_at: local_now.format(DISPLAY_TIME_FORMAT).to_string(),
        next_refresh_at,
    }
}

/// `None` when the interval does not fit a representable timestamp.
fn next_refresh_time(from: DateTime<Local>, interval_ms: u64) -> Option<String> {
    let delta = TimeDelta::try_milliseconds(i64::try_from(interval_ms).ok()?)?;
    from.checked_add_signed(delta)
        .map(|at| at.format(DISPLAY_TIME_FORMAT).to_string())
}

/// The window used when a caller supplies no filter: yesterday through
/// today with the configured point count.
pub fn default_window(cfg: &DashboardConfig, now: DateTime<Utc>) -> WindowRequest {
    let today = now.with_timezone(&Local).date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);
    WindowRequest::between(yesterday, today, cfg.default_points)
}

pub trait SnapshotSource: Send + Sync + 'static {
    fn refresh(&self, req: &WindowRequest) -> RefreshOutcome;
    fn last_snapshot(&self) -> Option<DashboardSnapshot>;
    fn config(&self) -> &DashboardConfig;
}

/// File-backed source that remembers the last fresh snapshot.
#[derive(Clone)]
pub struct CsvSnapshotSource {
    cfg: Arc<DashboardConfig>,
    last: Arc<RwLock<Option<DashboardSnapshot>>>,
}

impl CsvSnapshotSource {
    pub fn new(cfg: DashboardConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            last: Arc::new(RwLock::new(None)),
        }
    }

    fn store(&self, snapshot: &DashboardSnapshot) {
        if let Ok(mut guard) = self.last.write() {
            *guard = Some(snapshot.clone());
        }
    }

    /// Starts the periodic refresh of the default window on the current
    /// tokio runtime.
    pub fn spawn_polling(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period_ms = self.cfg.refresh_interval_ms.clamp(1, MAX_REFRESH_INTERVAL_MS);
        let period = StdDuration::from_millis(period_ms);
        info!(
            component = "refresh",
            event = "dashboard.polling.start",
            refresh_interval_ms = self.cfg.refresh_interval_ms
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let req = default_window(&self.cfg, Utc::now());
                let previous_fingerprint = self
                    .last_snapshot()
                    .map(|snapshot| snapshot.source_fingerprint);

                if let RefreshOutcome::Fresh(snapshot) = self.refresh(&req) {
                    if previous_fingerprint.as_deref() == Some(snapshot.source_fingerprint.as_str())
                    {
                        debug!(
                            component = "refresh",
                            event = "dashboard.polling.source_unchanged",
                            fingerprint = %snapshot.source_fingerprint
                        );
                    }
                }
            }
        })
    }
}

impl SnapshotSource for CsvSnapshotSource {
    fn refresh(&self, req: &WindowRequest) -> RefreshOutcome {
        let outcome = refresh_snapshot(&self.cfg, req, Utc::now());
        if let RefreshOutcome::Fresh(snapshot) = &outcome {
            self.store(snapshot);
        }
        outcome
    }

    fn last_snapshot(&self) -> Option<DashboardSnapshot> {
        self.last.read().ok().and_then(|guard| guard.clone())
    }

    fn config(&self) -> &DashboardConfig {
        &self.cfg
    }
}
