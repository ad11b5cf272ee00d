//! Subscriber setup and the lifecycle events shared by both binaries.
//!
//! `PRICEDASH_LOG_LEVEL` takes an `EnvFilter` directive list; a list that
//! does not parse is replaced by `info` as a whole.

use std::env;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{parse_bool, DashboardConfig};

const DEFAULT_FILTER: &str = "info";

/// Output shape of the fmt subscriber. `Compact` suits the cron-driven
/// rollup, `Json` suits log shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Unset or unrecognized values keep the defaults. Nothing is logged
    /// here since no subscriber exists yet.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let read = |key: &str| {
            env::var(key)
                .ok()
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(filter) = read("PRICEDASH_LOG_LEVEL") {
            config.filter = filter;
        }
        if let Some(format) = read("PRICEDASH_LOG_FORMAT").as_deref().and_then(LogFormat::parse) {
            config.format = format;
        }
        if let Some(include_target) = read("PRICEDASH_LOG_TARGET").as_deref().and_then(parse_bool) {
            config.include_target = include_target;
        }

        config
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .parse(&self.filter)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.include_target)
        .with_ansi(config.format != LogFormat::Json);

    match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    Ok(())
}

pub fn log_app_start(component: &'static str, config: &LoggingConfig) {
    info!(
        component,
        event = "app.start",
        log_filter = %config.filter,
        log_format = config.format.as_str(),
        include_target = config.include_target
    );
}

pub fn log_app_bind(bound_addr: SocketAddr, cfg: &DashboardConfig) {
    info!(
        component = "dashboard_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        url = %format!("http://{bound_addr}/dashboard"),
        locale = ?cfg.locale,
        gauge_mode = ?cfg.gauge_mode,
        default_points = ?cfg.default_points,
        market_tz = %cfg.market_tz
    );
}

pub fn log_source_selected(data_path: &Path, report_path: &Path, refresh_interval_ms: Option<u64>) {
    match refresh_interval_ms {
        Some(refresh_interval_ms) => info!(
            component = "dashboard_server",
            event = "source.selected",
            data_path = %data_path.display(),
            report_path = %report_path.display(),
            auto_refresh = true,
            refresh_interval_ms
        ),
        None => info!(
            component = "dashboard_server",
            event = "source.selected",
            data_path = %data_path.display(),
            report_path = %report_path.display(),
            auto_refresh = false
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use tracing::level_filters::LevelFilter;

    const KEYS: [&str; 3] = [
        "PRICEDASH_LOG_LEVEL",
        "PRICEDASH_LOG_FORMAT",
        "PRICEDASH_LOG_TARGET",
    ];

    fn config_with(values: [Option<&str>; 3]) -> LoggingConfig {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock should not be poisoned");

        let saved: Vec<Option<String>> = KEYS.iter().map(|key| env::var(key).ok()).collect();
        for (key, value) in KEYS.iter().zip(values) {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let config = LoggingConfig::from_env();

        for (key, value) in KEYS.iter().zip(saved) {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        config
    }

    #[test]
    fn unset_env_gives_pretty_info_with_targets() {
        assert_eq!(config_with([None, None, None]), LoggingConfig::default());
    }

    #[test]
    fn env_overrides_are_applied() {
        let cfg = config_with([Some("pricedash=debug"), Some(" JSON "), Some("off")]);
        assert_eq!(cfg.filter, "pricedash=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);

        let compact = config_with([None, Some("compact"), None]);
        assert_eq!(compact.format, LogFormat::Compact);
    }

    #[test]
    fn malformed_filter_directives_fall_back_to_info() {
        let cfg = LoggingConfig {
            filter: "pricedash=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(cfg.env_filter().max_level_hint(), Some(LevelFilter::INFO));

        let debug = LoggingConfig {
            filter: "debug".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(debug.env_filter().max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn unrecognized_values_are_ignored() {
        let cfg = config_with([Some("   "), Some("yaml"), Some("sometimes")]);
        assert_eq!(cfg, LoggingConfig::default());
    }
}
