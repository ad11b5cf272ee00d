//! Dashboard configuration: file paths, column aliases, locale, gauge mode
//! and polling cadence.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::stats::{GaugeMode, DEFAULT_HISTOGRAM_BINS};

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_POINTS: usize = 48;
/// Longest accepted polling period: one day.
pub const MAX_REFRESH_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Fr,
}

/// Display strings for one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleLabels {
    pub title: &'static str,
    pub last: &'static str,
    pub mean: &'static str,
    pub median: &'static str,
    pub std_dev: &'static str,
    pub coefficient_of_variation: &'static str,
    pub min: &'static str,
    pub max: &'static str,
    pub skew: &'static str,
    pub range: &'static str,
    pub gauge: &'static str,
    pub returns: &'static str,
    pub time: &'static str,
    pub price: &'static str,
    pub market: &'static str,
    pub market_open: &'static str,
    pub market_closed: &'static str,
    pub report_pending: &'static str,
    pub report_missing: &'static str,
    pub report_ready: &'static str,
    pub last_update: &'static str,
    pub no_data: &'static str,
    pub download: &'static str,
}

const EN_LABELS: LocaleLabels = LocaleLabels {
    title: "Live Price Dashboard",
    last: "Last",
    mean: "Mean",
    median: "Median",
    std_dev: "Std dev",
    coefficient_of_variation: "CV",
    min: "Min",
    max: "Max",
    skew: "Skew",
    range: "Range",
    gauge: "Last value",
    returns: "Return distribution (%)",
    time: "Time",
    price: "Price",
    market: "Market",
    market_open: "Open",
    market_closed: "Closed",
    report_pending: "The daily report will be available at 20:00.",
    report_missing: "Today's report has not been generated yet.",
    report_ready: "Daily report",
    last_update: "Last update",
    no_data: "No data available yet.",
    download: "Download CSV",
};

const FR_LABELS: LocaleLabels = LocaleLabels {
    title: "Prix en temps réel",
    last: "Dernière valeur",
    mean: "Moyenne",
    median: "Médiane",
    std_dev: "Écart-type",
    coefficient_of_variation: "CV",
    min: "Min",
    max: "Max",
    skew: "Asymétrie",
    range: "Étendue",
    gauge: "Dernière valeur",
    returns: "Distribution des rendements (%)",
    time: "Heure",
    price: "Prix",
    market: "Marché",
    market_open: "Ouvert",
    market_closed: "Fermé",
    report_pending: "Le rapport quotidien sera affiché à 20h.",
    report_missing: "Le rapport du jour n'a pas encore été généré.",
    report_ready: "Rapport du jour",
    last_update: "Dernière mise à jour",
    no_data: "Aucune donnée disponible.",
    download: "Télécharger CSV",
};

impl Locale {
    pub fn labels(self) -> &'static LocaleLabels {
        match self {
            Self::En => &EN_LABELS,
            Self::Fr => &FR_LABELS,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown locale '{0}', expected en or fr")]
    UnknownLocale(String),
    #[error("unknown gauge mode '{0}', expected previous-value or percent-change")]
    UnknownGaugeMode(String),
    #[error("invalid point count '{0}', expected a positive integer or 'all'")]
    InvalidPoints(String),
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
    #[error("invalid refresh interval '{0}', expected 1..=86400000 milliseconds")]
    InvalidRefreshInterval(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub data_path: PathBuf,
    pub report_path: PathBuf,
    pub time_columns: Vec<String>,
    pub locale: Locale,
    pub gauge_mode: GaugeMode,
    pub default_points: Option<usize>,
    pub histogram_bins: usize,
    pub refresh_interval_ms: u64,
    pub auto_refresh: bool,
    pub bind_addr: SocketAddr,
    pub market_tz: Tz,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data.csv"),
            report_path: PathBuf::from("daily_report.csv"),
            time_columns: vec!["timestamp".to_string(), "time".to_string()],
            locale: Locale::En,
            gauge_mode: GaugeMode::PreviousValue,
            default_points: Some(DEFAULT_POINTS),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            auto_refresh: true,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            market_tz: chrono_tz::Europe::London,
        }
    }
}

impl DashboardConfig {
    pub fn labels(&self) -> &'static LocaleLabels {
        self.locale.labels()
    }

    /// Reads `PRICEDASH_*` overrides. Invalid values are logged and the
    /// default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(raw) = env_value("PRICEDASH_DATA_PATH") {
            config.data_path = PathBuf::from(raw);
        }
        if let Some(raw) = env_value("PRICEDASH_REPORT_PATH") {
            config.report_path = PathBuf::from(raw);
        }
        if let Some(raw) = env_value("PRICEDASH_TIME_COLUMNS") {
            let aliases: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .map(str::to_string)
                .collect();
            if !aliases.is_empty() {
                config.time_columns = aliases;
            }
        }
        apply("PRICEDASH_LOCALE", parse_locale, &mut config.locale);
        apply("PRICEDASH_GAUGE_MODE", parse_gauge_mode, &mut config.gauge_mode);
        apply("PRICEDASH_DEFAULT_POINTS", parse_points, &mut config.default_points);
        apply("PRICEDASH_MARKET_TZ", parse_time_zone, &mut config.market_tz);

        apply(
            "PRICEDASH_REFRESH_INTERVAL_MS",
            parse_refresh_interval,
            &mut config.refresh_interval_ms,
        );
        if let Some(raw) = env_value("PRICEDASH_AUTO_REFRESH") {
            match parse_bool(&raw) {
                Some(enabled) => config.auto_refresh = enabled,
                None => warn_invalid("PRICEDASH_AUTO_REFRESH", &raw),
            }
        }
        if let Some(raw) = env_value("PRICEDASH_DASHBOARD_ADDR") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => config.bind_addr = addr,
                Err(_) => warn_invalid("PRICEDASH_DASHBOARD_ADDR", &raw),
            }
        }

        config
    }
}

pub fn parse_locale(raw: &str) -> Result<Locale, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "en" | "english" => Ok(Locale::En),
        "fr" | "french" => Ok(Locale::Fr),
        _ => Err(ConfigError::UnknownLocale(raw.to_string())),
    }
}

pub fn parse_gauge_mode(raw: &str) -> Result<GaugeMode, ConfigError> {
    match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "previous-value" | "previous" => Ok(GaugeMode::PreviousValue),
        "percent-change" | "percent" => Ok(GaugeMode::PercentChange),
        _ => Err(ConfigError::UnknownGaugeMode(raw.to_string())),
    }
}

/// `all` means unbounded.
pub fn parse_points(raw: &str) -> Result<Option<usize>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    match trimmed.parse::<usize>() {
        Ok(points) if points > 0 => Ok(Some(points)),
        _ => Err(ConfigError::InvalidPoints(raw.to_string())),
    }
}

pub fn parse_refresh_interval(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if (1..=MAX_REFRESH_INTERVAL_MS).contains(&ms) => Ok(ms),
        _ => Err(ConfigError::InvalidRefreshInterval(raw.to_string())),
    }
}

pub fn parse_time_zone(raw: &str) -> Result<Tz, ConfigError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimeZone(raw.to_string()))
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn apply<T>(key: &str, parse: impl Fn(&str) -> Result<T, ConfigError>, slot: &mut T) {
    let Some(raw) = env_value(key) else {
        return;
    };
    match parse(&raw) {
        Ok(value) => *slot = value,
        Err(err) => warn!(
            component = "config",
            event = "config.invalid",
            key,
            error = %err
        ),
    }
}

fn warn_invalid(key: &str, raw: &str) {
    warn!(
        component = "config",
        event = "config.invalid",
        key,
        value = raw
    );
}
