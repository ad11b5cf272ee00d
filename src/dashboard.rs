//! Dashboard HTTP routes and HTML rendering.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{parse_points, DashboardConfig, LocaleLabels};
use crate::daily_report::{read_report_or_empty, DailyReportRow};
use crate::market::DailyReportNotice;
use crate::refresh::{
    default_window, DashboardSnapshot, RefreshFailure, RefreshOutcome, SnapshotSource, TableRow,
};
use crate::window::WindowRequest;

pub const DOWNLOAD_FILE_NAME: &str = "pricedash_data.csv";

pub const TABLE_COLUMN_KEYS: [&str; 6] = [
    "timestamp",
    "price",
    "percentchange",
    "netchange",
    "high",
    "low",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DashboardQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub points: Option<String>,
}

impl DashboardQuery {
    fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.points.is_none()
    }

    /// An unparseable point count falls back to the configured default.
    pub fn to_window(&self, cfg: &DashboardConfig) -> WindowRequest {
        let max_points = match self.points.as_deref() {
            Some(raw) => parse_points(raw).unwrap_or(cfg.default_points),
            None => cfg.default_points,
        };
        WindowRequest {
            start: self.start.clone(),
            end: self.end.clone(),
            max_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RefreshFailure>,
    pub snapshot: Option<DashboardSnapshot>,
}

pub fn dashboard_router(source: Arc<dyn SnapshotSource>) -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard_html))
        .route("/dashboard/snapshot", get(get_dashboard_snapshot))
        .route("/dashboard/download.csv", get(get_download_csv))
        .route("/dashboard/report", get(get_daily_report))
        .with_state(DashboardAppState { source })
}

/// Runs a refresh and pairs the result with whatever snapshot should be
/// displayed: the fresh one, or the last good one when nothing changed.
pub fn resolve_refresh(source: &dyn SnapshotSource, req: &WindowRequest) -> SnapshotResponse {
    match source.refresh(req) {
        RefreshOutcome::Fresh(snapshot) => SnapshotResponse {
            status: "fresh",
            reason: None,
            snapshot: Some(*snapshot),
        },
        RefreshOutcome::Unchanged { reason, .. } => SnapshotResponse {
            status: "unchanged",
            reason: Some(reason),
            snapshot: source.last_snapshot(),
        },
    }
}

pub fn render_dashboard_html(
    snapshot: Option<&DashboardSnapshot>,
    labels: &LocaleLabels,
    refresh_interval_ms: Option<u64>,
) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str(&format!("<title>{}</title>\n", escape_html(labels.title)));
    out.push_str("<style>body{margin:0;background:#1f1f1f;color:#f4f4f4;font-family:\"Segoe UI\",sans-serif}.shell{max-width:1300px;margin:0 auto;padding:20px}.hero h1{margin:0 0 8px;color:#facd1b}.hero-meta{display:flex;gap:16px;flex-wrap:wrap;font-size:.9rem;color:#c9c9c9}.cards{display:grid;grid-template-columns:repeat(auto-fill,minmax(150px,1fr));gap:12px;margin-top:16px}.card{background:#2b2b2b;border-radius:10px;padding:12px}.card h4{margin:0 0 6px;font-size:.8rem;text-transform:uppercase;color:#aaa}.card .value{font-size:1.3rem;font-weight:700}.open{color:#3fbf5f}.closed{color:#e05050}table{width:100%;border-collapse:collapse;margin-top:16px}th{background:#facd1b;color:#1f1f1f;padding:8px}td{padding:6px 8px;border-bottom:1px solid #3a3a3a;text-align:right}a.download{color:#facd1b}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");
    out.push_str(&format!(
        "<section class=\"hero\"><h1>{}</h1>",
        escape_html(labels.title)
    ));

    let Some(snapshot) = snapshot else {
        out.push_str(&format!(
            "<p id=\"no-data\">{}</p></section></main></body></html>\n",
            escape_html(labels.no_data)
        ));
        return out;
    };

    out.push_str("<div class=\"hero-meta\">");
    let (market_class, market_text) = if snapshot.market.open {
        ("open", labels.market_open)
    } else {
        ("closed", labels.market_closed)
    };
    out.push_str(&format!(
        "<span id=\"market-status\">{}: <b class=\"{market_class}\">{}</b></span>",
        escape_html(labels.market),
        escape_html(market_text)
    ));
    out.push_str(&format!(
        "<span id=\"footer-timestamp\">{}: {}</span>",
        escape_html(labels.last_update),
        escape_html(&snapshot.generated_at)
    ));
    out.push_str(&format!(
        "<a class=\"download\" href=\"/dashboard/download.csv\">{}</a>",
        escape_html(labels.download)
    ));
    out.push_str("</div></section>\n");

    let stats = &snapshot.stats;
    let cards = [
        ("last-value", labels.last, format!("{:.2}", stats.last)),
        ("mean-value", labels.mean, format!("{:.2}", stats.mean)),
        ("median-value", labels.median, format!("{:.2}", stats.median)),
        ("std-value", labels.std_dev, format!("{:.2}", stats.std_dev)),
        (
            "cv-value",
            labels.coefficient_of_variation,
            format!("{:.2}%", stats.coefficient_of_variation),
        ),
        ("min-value", labels.min, format!("{:.2}", stats.min)),
        ("max-value", labels.max, format!("{:.2}", stats.max)),
        ("skew-value", labels.skew, format!("{:.2}", stats.skew)),
        ("range-value", labels.range, format!("{:.2}", stats.range)),
        (
            "gauge-value",
            labels.gauge,
            format!("{:.2} ({:+.2})", snapshot.gauge.value, snapshot.gauge.delta),
        ),
    ];
    out.push_str("<section class=\"cards\">");
    for (id, label, value) in cards {
        out.push_str(&format!(
            "<div class=\"card\"><h4>{}</h4><div class=\"value\" id=\"{id}\">{}</div></div>",
            escape_html(label),
            escape_html(&value)
        ));
    }
    out.push_str("</section>\n");

    out.push_str(&format!(
        "<section id=\"daily-report\" class=\"card\">{}</section>\n",
        render_report_notice(&snapshot.daily_report, labels)
    ));

    out.push_str(&format!(
        "<section id=\"returns\" class=\"card\"><h4>{}</h4><table><tbody>",
        escape_html(labels.returns)
    ));
    for bin in &snapshot.histogram {
        out.push_str(&format!(
            "<tr><td>{:.2} .. {:.2}</td><td>{}</td></tr>",
            bin.lower, bin.upper, bin.count
        ));
    }
    out.push_str("</tbody></table></section>\n");

    out.push_str("<table id=\"data-table\"><thead><tr>");
    for key in TABLE_COLUMN_KEYS {
        let heading = match key {
            "timestamp" => labels.time,
            "price" => labels.price,
            other => other,
        };
        out.push_str(&format!("<th>{}</th>", escape_html(heading)));
    }
    out.push_str("</tr></thead><tbody>\n");
    for (idx, row) in snapshot.rows.iter().enumerate() {
        out.push_str(&format!("<tr data-row=\"{idx}\">"));
        for value in table_cell_values(row) {
            out.push_str("<td>");
            out.push_str(&escape_html(&value));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody></table>\n");

    if let Some(interval_ms) = refresh_interval_ms {
        out.push_str("<script>\n");
        out.push_str("const ids={last:'last-value',mean:'mean-value',median:'median-value',std_dev:'std-value',min:'min-value',max:'max-value',skew:'skew-value',range:'range-value'};\n");
        out.push_str("async function refresh(){const res=await fetch('/dashboard/snapshot'+window.location.search);if(!res.ok){return;}const body=await res.json();if(body.status!=='fresh'||!body.snapshot){return;}const s=body.snapshot.stats;for(const [key,id] of Object.entries(ids)){document.getElementById(id).textContent=s[key].toFixed(2);}document.getElementById('cv-value').textContent=s.coefficient_of_variation.toFixed(2)+'%';}\n");
        out.push_str(&format!("setInterval(refresh, {interval_ms});\n"));
        out.push_str("</script>\n");
    }

    out.push_str("</main></body></html>\n");
    out
}

pub fn render_download_csv(rows: &[TableRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TABLE_COLUMN_KEYS)?;
    for row in rows {
        writer.write_record(table_cell_values(row))?;
    }
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

fn table_cell_values(row: &TableRow) -> [String; 6] {
    [
        row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        row.price.to_string(),
        display_or_blank(row.percentchange),
        display_or_blank(row.netchange),
        display_or_blank(row.high),
        display_or_blank(row.low),
    ]
}

fn render_report_notice(notice: &DailyReportNotice, labels: &LocaleLabels) -> String {
    match notice {
        DailyReportNotice::Pending { .. } => escape_html(labels.report_pending),
        DailyReportNotice::NotGenerated => escape_html(labels.report_missing),
        DailyReportNotice::Ready { row } => format!(
            "<b>{} {}</b>: open {:.2} | close {:.2} | high {:.2} | low {:.2} | volatility {:.2} | evolution {:+.2}%",
            escape_html(labels.report_ready),
            escape_html(&row.date),
            row.open,
            row.close,
            row.high,
            row.low,
            row.volatility,
            row.evolution_pct
        ),
    }
}

fn display_or_blank(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Clone)]
struct DashboardAppState {
    source: Arc<dyn SnapshotSource>,
}

impl DashboardAppState {
    fn window_for(&self, query: &DashboardQuery) -> WindowRequest {
        let cfg = self.source.config();
        if query.is_empty() {
            default_window(cfg, chrono::Utc::now())
        } else {
            query.to_window(cfg)
        }
    }
}

async fn get_dashboard_html(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> impl IntoResponse {
    let req = state.window_for(&query);
    let response = resolve_refresh(state.source.as_ref(), &req);
    info!(
        component = "dashboard",
        event = "http.dashboard.request",
        status = response.status
    );

    let cfg = state.source.config();
    let refresh_interval_ms = cfg.auto_refresh.then_some(cfg.refresh_interval_ms);
    Html(render_dashboard_html(
        response.snapshot.as_ref(),
        cfg.labels(),
        refresh_interval_ms,
    ))
}

async fn get_dashboard_snapshot(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> impl IntoResponse {
    let req = state.window_for(&query);
    let response = resolve_refresh(state.source.as_ref(), &req);
    info!(
        component = "dashboard",
        event = "http.snapshot.request",
        status = response.status,
        reason = response.reason.map(RefreshFailure::as_str).unwrap_or("none")
    );
    Json(response)
}

async fn get_download_csv(State(state): State<DashboardAppState>) -> Response {
    let Some(snapshot) = state.source.last_snapshot() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match render_download_csv(&snapshot.rows) {
        Ok(body) => {
            info!(
                component = "dashboard",
                event = "http.download.request",
                rows = snapshot.rows.len()
            );
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(err) => {
            warn!(
                component = "dashboard",
                event = "http.download.failed",
                error = %err
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_daily_report(State(state): State<DashboardAppState>) -> Json<Vec<DailyReportRow>> {
    Json(read_report_or_empty(&state.source.config().report_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Locale;
    use crate::market::MarketStatus;
    use crate::stats::{GaugeMode, GaugeReading, HistogramBin, PriceStats};
    use chrono::NaiveDate;

    fn table_row(hour: u32, price: f64) -> TableRow {
        TableRow {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .and_then(|d| d.and_hms_opt(hour, 0, 0))
                .unwrap(),
            price,
            percentchange: Some(0.5),
            netchange: None,
            high: Some(price + 1.0),
            low: Some(price - 1.0),
        }
    }

    fn snapshot(rows: Vec<TableRow>) -> DashboardSnapshot {
        let prices: Vec<f64> = rows.iter().map(|row| row.price).collect();
        let stats = PriceStats::compute(&prices);
        DashboardSnapshot {
            window: WindowRequest::default(),
            stats,
            gauge: GaugeReading::from_stats(&stats, GaugeMode::PreviousValue),
            returns: Vec::new(),
            histogram: Vec::new(),
            rows,
            date_bounds: None,
            source_fingerprint: String::new(),
            market: MarketStatus {
                open: true,
                local_time: "2024-03-04 09:00:00".to_string(),
                time_zone: "Europe/London".to_string(),
            },
            daily_report: DailyReportNotice::Pending {
                available_at: "20:00".to_string(),
            },
            generated_at: "2024-03-04 09:00:00".to_string(),
            next_refresh_at: None,
        }
    }

    #[test]
    fn query_points_fall_back_to_default_when_invalid() {
        let cfg = DashboardConfig::default();
        let query = DashboardQuery {
            points: Some("many".to_string()),
            ..DashboardQuery::default()
        };
        assert_eq!(query.to_window(&cfg).max_points, Some(48));

        let all = DashboardQuery {
            points: Some("all".to_string()),
            ..DashboardQuery::default()
        };
        assert_eq!(all.to_window(&cfg).max_points, None);
    }

    #[test]
    fn rendered_html_has_cards_table_and_polling() {
        let snap = snapshot(vec![table_row(9, 100.0), table_row(10, 105.0)]);
        let html = render_dashboard_html(Some(&snap), Locale::En.labels(), Some(300_000));

        assert!(html.contains("id=\"last-value\">105.00<"));
        assert!(html.contains("id=\"range-value\">5.00<"));
        assert!(html.contains("<tr data-row=\"1\">"));
        assert!(html.contains("setInterval(refresh, 300000)"));
        assert!(html.contains("The daily report will be available at 20:00."));
    }

    #[test]
    fn returns_histogram_and_column_headings_use_locale_labels() {
        let mut snap = snapshot(vec![table_row(9, 100.0), table_row(10, 105.0)]);
        snap.histogram = vec![HistogramBin {
            lower: -1.0,
            upper: 5.0,
            count: 1,
        }];

        let en = render_dashboard_html(Some(&snap), Locale::En.labels(), None);
        assert!(en.contains("<h4>Return distribution (%)</h4>"));
        assert!(en.contains("<td>-1.00 .. 5.00</td><td>1</td>"));
        assert!(en.contains("<th>Time</th><th>Price</th><th>percentchange</th>"));

        let fr = render_dashboard_html(Some(&snap), Locale::Fr.labels(), None);
        assert!(fr.contains("<h4>Distribution des rendements (%)</h4>"));
        assert!(fr.contains("<th>Heure</th><th>Prix</th>"));
    }

    #[test]
    fn polling_script_is_omitted_when_auto_refresh_is_off() {
        let snap = snapshot(vec![table_row(9, 100.0)]);
        let html = render_dashboard_html(Some(&snap), Locale::Fr.labels(), None);
        assert!(!html.contains("setInterval"));
        assert!(html.contains("Ouvert"));
    }

    #[test]
    fn missing_snapshot_renders_placeholder() {
        let html = render_dashboard_html(None, Locale::En.labels(), Some(1_000));
        assert!(html.contains("id=\"no-data\""));
        assert!(!html.contains("data-table"));
    }

    #[test]
    fn download_csv_keeps_column_order_and_blanks() {
        let body = render_download_csv(&[table_row(9, 100.0)]).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "timestamp,price,percentchange,netchange,high,low\n2024-03-04 09:00:00,100,0.5,,101,99\n"
        );

        let empty = String::from_utf8(render_download_csv(&[]).unwrap()).unwrap();
        assert_eq!(empty, "timestamp,price,percentchange,netchange,high,low\n");
    }

    #[test]
    fn html_escaping_covers_markup_characters() {
        assert_eq!(escape_html("<a href='x'>&"), "&lt;a href=&#39;x&#39;&gt;&amp;");
    }
}
