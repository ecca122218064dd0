use std::io;

use thiserror::Error;

/// Result type used across the statusline crates.
pub type Result<T> = std::result::Result<T, StatusLineError>;

/// Canonical error representation shared by the timeline engine and its backings.
#[derive(Debug, Error)]
pub enum StatusLineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The request can never succeed as sent; callers must not retry it.
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The lock for `key` stayed contended for the whole acquisition window.
    #[error("timed out after {waited_ms}ms waiting for lock {key}")]
    LockTimeout { key: String, waited_ms: u64 },

    #[error("lock error: {0}")]
    Lock(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("collaborator failure: {0}")]
    Collaborator(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

impl StatusLineError {
    pub fn validation(message: impl Into<String>) -> Self {
        StatusLineError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StatusLineError::NotFound(message.into())
    }

    /// Whether the caller may retry the same request later (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusLineError::LockTimeout { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StatusLineError::Validation(_))
    }
}

impl From<serde_json::Error> for StatusLineError {
    fn from(err: serde_json::Error) -> Self {
        StatusLineError::Serialization(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StatusLineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StatusLineError::Database(sqlx::Error::Migrate(Box::new(err)))
    }
}

impl From<anyhow::Error> for StatusLineError {
    fn from(err: anyhow::Error) -> Self {
        StatusLineError::General(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {value}")]
    InvalidEnvVar { key: String, value: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for StatusLineError {
    fn from(value: ConfigError) -> Self {
        StatusLineError::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_timeouts_are_retryable() {
        let timeout = StatusLineError::LockTimeout {
            key: "monitor".into(),
            waited_ms: 50,
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_validation());

        let invalid = StatusLineError::validation("monitorId is null");
        assert!(invalid.is_validation());
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.to_string(), "monitorId is null");
    }

    #[test]
    fn config_errors_convert() {
        let err: StatusLineError = ConfigError::MissingEnvVar("DATABASE_URL".into()).into();
        assert!(matches!(
            err,
            StatusLineError::Config(message) if message.contains("DATABASE_URL")
        ));
    }
}
