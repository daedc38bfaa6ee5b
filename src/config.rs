//! Configuration loaded from the environment.
//!
//! The binary calls `dotenvy::dotenv()` first, so a local `.env` file is
//! honored. Every numeric value is validated; a malformed value is an error,
//! never a silent fallback to the default.

use std::time::Duration;

use chrono::FixedOffset;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scan: ScanConfig,
    pub engine: EngineConfig,
    pub tenant_offset: FixedOffset,
}

impl Config {
    /// Load the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            scan: ScanConfig::from_env()?,
            engine: EngineConfig::from_env()?,
            tenant_offset: tenant_offset_from_env()?,
        })
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required("DATABASE_URL")?;
        Ok(Self {
            url: SecretString::from(url),
            pool_size: parse_or("DATABASE_POOL_SIZE", 10usize)?,
        })
    }
}

/// Stall scan tuning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Interval between driver ticks.
    pub interval: Duration,
    /// Tickets processed concurrently per batch.
    pub batch_size: usize,
    /// Inbound activity newer than this is considered still in flight.
    pub freshness_window: Duration,
    /// Upper bound for replaying one ticket.
    pub replay_timeout: Duration,
    /// Restrict scans to one tenant.
    pub tenant_id: Option<i64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 3000,
            freshness_window: Duration::from_secs(3 * 60),
            replay_timeout: Duration::from_secs(120),
            tenant_id: None,
        }
    }
}

impl ScanConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let batch_size = nonzero(
            "STALL_SCAN_BATCH_SIZE",
            parse_or("STALL_SCAN_BATCH_SIZE", defaults.batch_size)?,
        )?;
        // tokio's interval panics on a zero period
        let interval_secs = nonzero(
            "STALL_SCAN_INTERVAL_SECS",
            parse_or("STALL_SCAN_INTERVAL_SECS", defaults.interval.as_secs())?,
        )?;

        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            batch_size,
            freshness_window: Duration::from_secs(parse_or(
                "STALL_FRESHNESS_SECS",
                defaults.freshness_window.as_secs(),
            )?),
            replay_timeout: Duration::from_secs(parse_or(
                "STALL_REPLAY_TIMEOUT_SECS",
                defaults.replay_timeout.as_secs(),
            )?),
            tenant_id: optional("STALL_SCAN_TENANT")
                .map(|v| parse_value("STALL_SCAN_TENANT", &v))
                .transpose()?,
        })
    }

    /// Age after which an in-progress marker is treated as abandoned.
    ///
    /// A live pass clears its markers within one replay timeout plus the
    /// time spent reading the rest of its batch; twice the timeout covers both.
    pub fn abandoned_marker_age(&self) -> Duration {
        self.replay_timeout.saturating_mul(2)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_replay_timeout(mut self, timeout: Duration) -> Self {
        self.replay_timeout = timeout;
        self
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// Endpoint of the conversation engine that receives replayed messages.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<SecretString>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            webhook_url: optional("ENGINE_WEBHOOK_URL"),
            webhook_secret: optional("ENGINE_WEBHOOK_SECRET").map(SecretString::from),
        })
    }
}

/// `TENANT_UTC_OFFSET_HOURS` as an offset (default UTC-3).
pub fn tenant_offset_from_env() -> Result<FixedOffset, ConfigError> {
    let hours: i32 = parse_or("TENANT_UTC_OFFSET_HOURS", -3)?;
    FixedOffset::east_opt(hours * 3600).ok_or_else(|| ConfigError::InvalidValue {
        key: "TENANT_UTC_OFFSET_HOURS".to_string(),
        message: format!("{hours} is outside -23..=23"),
    })
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn nonzero<T>(key: &str, value: T) -> Result<T, ConfigError>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}': {}", raw, e),
        })
}
