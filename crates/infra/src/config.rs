//! Process configuration from environment variables.

use std::time::Duration;

use hotelpos_observability::LogFormat;

use crate::error::InfraError;

pub const DATABASE_URL_ENV: &str = "HOTELPOS_DATABASE_URL";
pub const VALUATION_POLL_MS_ENV: &str = "HOTELPOS_VALUATION_POLL_MS";
pub const VALUATION_INTERVAL_SECS_ENV: &str = "HOTELPOS_VALUATION_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = hotelpos_observability::tracing::LOG_FORMAT_ENV;

const DEFAULT_VALUATION_POLL_MS: u64 = 20;
const DEFAULT_VALUATION_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Postgres stores when set, in-memory stores otherwise.
    pub database_url: Option<String>,
    /// Sleep between attempts to take the global valuation flag.
    pub valuation_poll: Duration,
    /// Period of the scheduled stock valuation job.
    pub valuation_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            valuation_poll: Duration::from_millis(DEFAULT_VALUATION_POLL_MS),
            valuation_interval: Duration::from_secs(DEFAULT_VALUATION_INTERVAL_SECS),
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let valuation_poll = match get(VALUATION_POLL_MS_ENV) {
            Some(raw) => Duration::from_millis(parse_positive(VALUATION_POLL_MS_ENV, &raw)?),
            None => defaults.valuation_poll,
        };
        let valuation_interval = match get(VALUATION_INTERVAL_SECS_ENV) {
            Some(raw) => Duration::from_secs(parse_positive(VALUATION_INTERVAL_SECS_ENV, &raw)?),
            None => defaults.valuation_interval,
        };
        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            database_url: get(DATABASE_URL_ENV),
            valuation_poll,
            valuation_interval,
            log_format,
        })
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, InfraError> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(InfraError::Config(format!(
            "{key} must be a positive integer, got {raw:?}"
        ))),
    }
}
