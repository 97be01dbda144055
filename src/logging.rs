//! Tracing subscriber setup.
//!
//! The level comes from `application.log_level`; `RUST_LOG` takes precedence
//! when set, so a single module can be turned up without editing the config:
//!
//! ```text
//! RUST_LOG=smu_daq::instrument=debug smu_daq constant-current
//! ```

use crate::config::SmuConfig;
use crate::error::{AppResult, SmuError};
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, coloured when writing to a terminal.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Build the filter: `RUST_LOG` if present, otherwise the configured level.
pub fn env_filter(default_level: &str) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            SmuError::Configuration(format!("invalid log filter '{default_level}': {e}"))
        }),
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for results.
///
/// # Errors
/// `Configuration` if the level is not a valid filter or a subscriber is
/// already installed.
pub fn init(config: &SmuConfig, format: LogFormat) -> AppResult<()> {
    let filter = env_filter(&config.application.log_level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| SmuError::Configuration(format!("failed to install logger: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_accepts_config_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(env_filter(level).is_ok());
        }
    }

    #[test]
    fn test_env_filter_accepts_directives() {
        assert!(EnvFilter::try_new("smu_daq::instrument=debug,warn").is_ok());
    }
}
