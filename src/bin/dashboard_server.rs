use std::sync::Arc;

use pricedash::{
    dashboard_router, default_window, init_logging, log_app_bind, log_app_start,
    log_source_selected, CsvSnapshotSource, DashboardConfig, LoggingConfig, RefreshOutcome,
    SnapshotSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = LoggingConfig::from_env();
    init_logging(&logging_cfg)?;
    log_app_start("dashboard_server", &logging_cfg);

    let cfg = DashboardConfig::from_env();
    let addr = cfg.bind_addr;
    log_source_selected(
        &cfg.data_path,
        &cfg.report_path,
        cfg.auto_refresh.then_some(cfg.refresh_interval_ms),
    );

    let source = Arc::new(CsvSnapshotSource::new(cfg));
    // The polling task refreshes on its first tick; manual mode warms up once.
    if source.config().auto_refresh {
        Arc::clone(&source).spawn_polling();
    } else if let RefreshOutcome::Unchanged { reason, detail } =
        source.refresh(&default_window(source.config(), chrono::Utc::now()))
    {
        tracing::warn!(
            component = "dashboard_server",
            event = "app.initial_refresh.unchanged",
            reason = reason.as_str(),
            detail = %detail
        );
    }

    let app = dashboard_router(Arc::clone(&source) as Arc<dyn SnapshotSource>);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr, source.config());
    axum::serve(listener, app).await?;

    Ok(())
}
