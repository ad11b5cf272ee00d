use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use pricedash::{dashboard_router, CsvSnapshotSource, DashboardConfig};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;

const SAMPLE_CSV: &str = "Time , Price,PercentChange,NetChange,High,Low\n\
2024-03-01 09:00:00,100,0,0,100.5,99.5\n\
2024-03-01 09:05:00,102,2,2,102.5,101.0\n\
2024-03-02 09:00:00,101,-0.98,-1,102.0,100.5\n\
2024-03-02 09:05:00,105,3.96,4,105.5,104.0\n";

fn setup(csv: &str) -> (TempDir, DashboardConfig) {
    let temp = tempdir().unwrap();
    let cfg = DashboardConfig {
        data_path: temp.path().join("data.csv"),
        report_path: temp.path().join("daily_report.csv"),
        ..DashboardConfig::default()
    };
    fs::write(&cfg.data_path, csv).unwrap();
    (temp, cfg)
}

fn app(cfg: DashboardConfig) -> Router {
    dashboard_router(Arc::new(CsvSnapshotSource::new(cfg)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec(), content_type)
}

async fn get_json(app: &Router, uri: &str) -> serde_json::Value {
    let (status, body, _) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

fn write(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
}

#[tokio::test]
async fn snapshot_endpoint_computes_window_statistics() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let app = app(cfg);

    let json = get_json(
        &app,
        "/dashboard/snapshot?start=2024-03-01&end=2024-03-02&points=4",
    )
    .await;

    assert_eq!(json["status"], "fresh");
    let snapshot = &json["snapshot"];
    assert_eq!(snapshot["rows"].as_array().unwrap().len(), 4);
    assert_eq!(snapshot["stats"]["last"], 105.0);
    assert_eq!(snapshot["stats"]["previous"], 101.0);
    assert_eq!(snapshot["stats"]["min"], 100.0);
    assert_eq!(snapshot["stats"]["max"], 105.0);
    assert_eq!(snapshot["stats"]["range"], 5.0);
    assert_eq!(snapshot["stats"]["mean"], 102.0);
    assert_eq!(snapshot["returns"].as_array().unwrap().len(), 3);
    assert_eq!(snapshot["date_bounds"]["min_date"], "2024-03-01");
    assert_eq!(snapshot["date_bounds"]["max_date"], "2024-03-02");
}

#[tokio::test]
async fn snapshot_endpoint_truncates_to_most_recent_points() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let app = app(cfg);

    let json = get_json(
        &app,
        "/dashboard/snapshot?start=2024-03-01&end=2024-03-02&points=2",
    )
    .await;
    let rows = json["snapshot"]["rows"].as_array().unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["timestamp"], "2024-03-02T09:00:00");
    assert_eq!(rows[1]["price"], 105.0);
}

#[tokio::test]
async fn malformed_dates_do_not_filter() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let app = app(cfg);

    let json = get_json(
        &app,
        "/dashboard/snapshot?start=garbage&end=2024-03-01&points=all",
    )
    .await;

    assert_eq!(json["status"], "fresh");
    assert_eq!(json["snapshot"]["rows"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn range_outside_data_reports_zero_statistics() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let app = app(cfg);

    let json = get_json(&app, "/dashboard/snapshot?start=2023-01-01&end=2023-01-31").await;

    assert_eq!(json["status"], "fresh");
    let snapshot = &json["snapshot"];
    assert!(snapshot["rows"].as_array().unwrap().is_empty());
    for key in ["last", "mean", "median", "std_dev", "coefficient_of_variation", "skew"] {
        assert_eq!(snapshot["stats"][key], 0.0, "{key}");
    }
}

#[tokio::test]
async fn broken_source_keeps_previous_snapshot() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let data_path = cfg.data_path.clone();
    let app = app(cfg);

    let first = get_json(&app, "/dashboard/snapshot?points=all").await;
    assert_eq!(first["status"], "fresh");

    write(&data_path, "timestamp,price\n2024-03-03 09:00:00,not-a-price\n");
    let second = get_json(&app, "/dashboard/snapshot?points=all").await;

    assert_eq!(second["status"], "unchanged");
    assert_eq!(second["reason"], "parse");
    assert_eq!(second["snapshot"], first["snapshot"]);
}

#[tokio::test]
async fn missing_source_without_history_returns_null_snapshot() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    fs::remove_file(&cfg.data_path).unwrap();
    let app = app(cfg);

    let json = get_json(&app, "/dashboard/snapshot").await;
    assert_eq!(json["status"], "unchanged");
    assert_eq!(json["reason"], "io");
    assert!(json["snapshot"].is_null());

    let (status, body, _) = get(&app, "/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("id=\"no-data\""));
}

#[tokio::test]
async fn dashboard_page_renders_cards_table_and_polling_script() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let app = app(cfg);

    let (status, body, _) = get(&app, "/dashboard?points=all&start=2024-03-01&end=2024-03-02").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();

    assert!(text.contains("<table id=\"data-table\""));
    assert!(text.contains("id=\"last-value\">105.00<"));
    assert!(text.contains("id=\"market-status\""));
    assert!(text.contains("setInterval(refresh, 300000)"));
    assert!(text.contains("/dashboard/download.csv"));
}

#[tokio::test]
async fn headerless_file_uses_fallback_columns_and_french_labels() {
    let (_temp, mut cfg) = setup(
        "2024-03-01 09:00:00,100,0,0,101,99\n2024-03-01 09:05:00,101,1,1,102,100\n",
    );
    cfg.locale = pricedash::Locale::Fr;
    cfg.auto_refresh = false;
    let app = app(cfg);

    let (_, body, _) = get(&app, "/dashboard?points=all").await;
    let text = String::from_utf8(body).unwrap();

    assert!(text.contains("Dernière valeur"));
    assert!(text.contains("id=\"last-value\">101.00<"));
    assert!(!text.contains("setInterval"));
}

#[tokio::test]
async fn download_returns_last_window_as_csv() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    let app = app(cfg);

    let (status, _, _) = get(&app, "/dashboard/download.csv").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    get_json(&app, "/dashboard/snapshot?start=2024-03-02&end=2024-03-02").await;
    let (status, body, content_type) = get(&app, "/dashboard/download.csv").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/csv; charset=utf-8"));
    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "timestamp,price,percentchange,netchange,high,low");
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("2024-03-02 09:05:00,105,"));
}

#[tokio::test]
async fn report_endpoint_lists_persisted_rows() {
    let (_temp, cfg) = setup(SAMPLE_CSV);
    write(
        &cfg.report_path,
        "date,open,close,high,low,volatility,evolution_%\n2024-03-01,100,102,102.5,99.5,3,2\n",
    );
    let app = app(cfg);

    let json = get_json(&app, "/dashboard/report").await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], "2024-03-01");
    assert_eq!(rows[0]["evolution_%"], 2.0);
}
