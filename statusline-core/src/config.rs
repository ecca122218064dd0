use std::env;
use std::str::FromStr;

use crate::errors::{ConfigError, StatusLineError};

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Global configuration shared across the services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: Option<String>,
    pub environment: Environment,
    pub node_name: String,
    /// Log level for the service crates when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("STATUSLINE_").map(|mut config| {
            if config.database_url.is_none() {
                config.database_url = env::var("DATABASE_URL").ok();
            }
            config
        })
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `TIMELINE_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let database_url = env::var(key("DATABASE_URL")).ok();
        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();
        let node_name =
            env::var(key("NODE_NAME")).unwrap_or_else(|_| "statusline-node".to_string());
        let log_level = env::var(key("LOG_LEVEL")).ok().filter(|level| !level.trim().is_empty());

        Ok(Self {
            database_url,
            environment,
            node_name,
            log_level,
        })
    }

    /// Returns the Postgres URL, failing when none was configured.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".into()))
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

/// Reads `key` and parses it, falling back to `default` when the variable is unset.
pub fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

/// Helper that loads config and converts to the canonical statusline error type.
pub fn load_core_config() -> Result<CoreConfig, StatusLineError> {
    Ok(CoreConfig::from_env()?)
}
