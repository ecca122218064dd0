use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use statusline_core::config::env_or;
use statusline_core::errors::ConfigError;

/// Where intervals, locks and status pointers live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Single process; nothing survives a restart.
    Memory,
    #[default]
    Postgres,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Backend::Memory),
            "postgres" | "pg" => Ok(Backend::Postgres),
            other => Err(format!("unknown backend {other}")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => f.write_str("memory"),
            Backend::Postgres => f.write_str("postgres"),
        }
    }
}

/// Tunables of the timeline engine and its housekeeping.
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    pub backend: Backend,
    pub lock_timeout: Duration,
    pub lease_ttl: Duration,
    pub annotation_timeout: Duration,
    pub retention_days: u32,
    pub sweep_interval: Duration,
    pub bind_address: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            lock_timeout: Duration::from_secs(10),
            lease_ttl: Duration::from_secs(30),
            annotation_timeout: Duration::from_secs(2),
            retention_days: 120,
            sweep_interval: Duration::from_secs(60 * 60),
            bind_address: "0.0.0.0:8082".to_string(),
        }
    }
}

impl TimelineConfig {
    /// Reads `STATUSLINE_*` variables, keeping defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            backend: env_or("STATUSLINE_BACKEND", defaults.backend)?,
            lock_timeout: Duration::from_millis(env_or(
                "STATUSLINE_LOCK_TIMEOUT_MS",
                defaults.lock_timeout.as_millis() as u64,
            )?),
            lease_ttl: Duration::from_secs(env_or(
                "STATUSLINE_LEASE_TTL_SECS",
                defaults.lease_ttl.as_secs(),
            )?),
            annotation_timeout: Duration::from_millis(env_or(
                "STATUSLINE_ANNOTATION_TIMEOUT_MS",
                defaults.annotation_timeout.as_millis() as u64,
            )?),
            retention_days: env_or("STATUSLINE_RETENTION_DAYS", defaults.retention_days)?,
            sweep_interval: Duration::from_secs(env_or(
                "STATUSLINE_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            bind_address: env_or("STATUSLINE_HTTP_BIND", defaults.bind_address)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects a zero lock timeout or retention, and a lease shorter than
    /// the lock acquisition window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar {
                key: "STATUSLINE_LOCK_TIMEOUT_MS".into(),
                value: "0".into(),
            });
        }
        if self.backend == Backend::Postgres && self.lease_ttl < self.lock_timeout {
            return Err(ConfigError::Internal(format!(
                "lease ttl {:?} must not be shorter than lock timeout {:?}",
                self.lease_ttl, self.lock_timeout
            )));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::InvalidEnvVar {
                key: "STATUSLINE_RETENTION_DAYS".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}
