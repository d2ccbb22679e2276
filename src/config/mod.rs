//! Configuration
//!
//! The tracker is configured entirely through `RADTRACK_*` environment
//! variables; there is no CLI surface. Every knob has a production default
//! so an empty environment yields a working local setup.
//!
//! | Variable | Default |
//! |---|---|
//! | `RADTRACK_LISTEN` | `127.0.0.1:3799` |
//! | `RADTRACK_STORE_ADDR` | `127.0.0.1:6379` |
//! | `RADTRACK_STORE_DB` | `0` |
//! | `RADTRACK_DEFAULT_TTL_SECS` | `300` |
//! | `RADTRACK_MAX_TTL_SECS` | `86400` |
//! | `RADTRACK_TTL_MARGIN_SECS` | `60` |
//! | `RADTRACK_INDEX_TTL_SECS` | `172800` |
//! | `RADTRACK_BACKOFF_BASE_MS` | `200` |
//! | `RADTRACK_BACKOFF_MAX_MS` | `30000` |
//! | `RADTRACK_BACKOFF_JITTER` | `0.2` |
//! | `RADTRACK_JANITOR_INTERVAL` | `10` |
//! | `RADTRACK_STORE_TIMEOUT_MS` | `2000` |
//!
//! Validation happens once at load: the index TTL must be strictly longer
//! than the session TTL ceiling (a Session Record must always expire before
//! the indices pointing at it), the default TTL must fit under the ceiling,
//! and the jitter fraction must sit in `[0, 1]`.

use crate::store::BackoffPolicy;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// Two settings contradict each other.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Intake bind address.
    pub listen_addr: String,
    /// Session store host:port.
    pub store_addr: String,
    /// Logical partition selected after connecting.
    pub store_db: u32,
    /// Session Record TTL when the NAS reports no interim interval.
    pub default_ttl: Duration,
    /// Absolute ceiling on the Session Record TTL.
    pub max_ttl: Duration,
    /// Margin added on top of `interim_interval * 2`.
    pub ttl_margin: Duration,
    /// User/NAS Index TTL, refreshed on every touch.
    pub index_ttl: Duration,
    /// Backoff base delay.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
    /// Backoff jitter fraction in `[0, 1]`.
    pub backoff_jitter: f64,
    /// Interim-Updates per janitor sweep, per user.
    pub janitor_interval: u64,
    /// Fixed timeout applied to every store I/O operation.
    pub store_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3799".to_string(),
            store_addr: "127.0.0.1:6379".to_string(),
            store_db: 0,
            default_ttl: Duration::from_secs(300),
            max_ttl: Duration::from_secs(86_400),
            ttl_margin: Duration::from_secs(60),
            index_ttl: Duration::from_secs(172_800),
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_millis(30_000),
            backoff_jitter: 0.2,
            janitor_interval: 10,
            store_timeout: Duration::from_millis(2_000),
        }
    }
}

impl TrackerConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            listen_addr: env_string("RADTRACK_LISTEN", defaults.listen_addr),
            store_addr: env_string("RADTRACK_STORE_ADDR", defaults.store_addr),
            store_db: env_parse("RADTRACK_STORE_DB", defaults.store_db)?,
            default_ttl: env_secs("RADTRACK_DEFAULT_TTL_SECS", defaults.default_ttl)?,
            max_ttl: env_secs("RADTRACK_MAX_TTL_SECS", defaults.max_ttl)?,
            ttl_margin: env_secs("RADTRACK_TTL_MARGIN_SECS", defaults.ttl_margin)?,
            index_ttl: env_secs("RADTRACK_INDEX_TTL_SECS", defaults.index_ttl)?,
            backoff_base: env_millis("RADTRACK_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_max: env_millis("RADTRACK_BACKOFF_MAX_MS", defaults.backoff_max)?,
            backoff_jitter: env_parse("RADTRACK_BACKOFF_JITTER", defaults.backoff_jitter)?,
            janitor_interval: env_parse("RADTRACK_JANITOR_INTERVAL", defaults.janitor_interval)?,
            store_timeout: env_millis("RADTRACK_STORE_TIMEOUT_MS", defaults.store_timeout)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_ttl <= self.max_ttl {
            return Err(ConfigError::Inconsistent(format!(
                "index TTL ({}s) must be strictly longer than the session TTL ceiling ({}s)",
                self.index_ttl.as_secs(),
                self.max_ttl.as_secs()
            )));
        }
        if self.default_ttl > self.max_ttl {
            return Err(ConfigError::Inconsistent(format!(
                "default TTL ({}s) exceeds the session TTL ceiling ({}s)",
                self.default_ttl.as_secs(),
                self.max_ttl.as_secs()
            )));
        }
        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(ConfigError::Inconsistent(format!(
                "backoff jitter {} is outside [0, 1]",
                self.backoff_jitter
            )));
        }
        if self.janitor_interval == 0 {
            return Err(ConfigError::Inconsistent(
                "janitor interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The backoff policy derived from the configured delays.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: self.backoff_base,
            max: self.backoff_max,
            jitter: self.backoff_jitter,
        }
    }
}

fn env_string(var: &'static str, default: String) -> String {
    std::env::var(var).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_secs(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(env_parse(var, default.as_secs())?))
}

fn env_millis(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(env_parse(
        var,
        default.as_millis() as u64,
    )?))
}
