use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::{Result, StatusLineError};

const DEFAULT_LEVEL: &str = "info";

/// Filter used when `RUST_LOG` is unset. The service crates log at `level`
/// while sqlx statement logging is held at `warn`.
pub fn default_directives(level: Option<&str>) -> String {
    let level = level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LEVEL);
    format!("{level},statusline_timeline={level},statusline_core={level},sqlx=warn")
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(level))
            .map_err(|err| StatusLineError::General(format!("invalid log level: {err}")))?,
    };

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .try_init()
        .map_err(|err| StatusLineError::General(err.to_string()))?;

    Ok(())
}
