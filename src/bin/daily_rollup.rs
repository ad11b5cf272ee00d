use std::process::ExitCode;

use chrono::Local;
use pricedash::{
    init_logging, log_app_start, run_daily_rollup, DashboardConfig, LoggingConfig, RollupError,
    RollupOutcome,
};
use tracing::error;

fn main() -> ExitCode {
    let logging_cfg = LoggingConfig::from_env();
    if let Err(err) = init_logging(&logging_cfg) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }
    log_app_start("daily_rollup", &logging_cfg);

    let cfg = DashboardConfig::from_env();
    let today = Local::now().date_naive();

    match run_daily_rollup(&cfg.data_path, &cfg.report_path, &cfg.time_columns, today) {
        Ok(RollupOutcome::Written { row, total_rows }) => {
            println!(
                "Daily report written for {} | open={} close={} evolution={:.2}% rows={}",
                row.date, row.open, row.close, row.evolution_pct, total_rows
            );
            ExitCode::SUCCESS
        }
        Ok(RollupOutcome::NoDataForDate { date }) => {
            println!("No observations for {date}; report left unchanged.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let event = match &err {
                RollupError::Observations(_) => "rollup.observations.failed",
                RollupError::Report(_) => "rollup.report.failed",
            };
            error!(
                component = "daily_rollup",
                event,
                data_path = %cfg.data_path.display(),
                report_path = %cfg.report_path.display(),
                error = %err
            );
            eprintln!("daily rollup failed: {err}");
            ExitCode::FAILURE
        }
    }
}
