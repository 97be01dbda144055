//! Configuration using Figment
//!
//! Configuration is layered, highest precedence last:
//! 1. Built-in defaults (a mock instrument, `info` logging)
//! 2. A TOML file (`config/smu_daq.toml` unless another path is given)
//! 3. Environment variables prefixed with `SMUDAQ_`, nested with `__`
//!
//! ```text
//! SMUDAQ_APPLICATION__LOG_LEVEL=debug
//! SMUDAQ_INSTRUMENT__RESOURCE="GPIB0::3::INSTR"
//! SMUDAQ_INSTRUMENT__MOCK=false
//! ```
//!
//! # Example
//!
//! ```no_run
//! use smu_daq::config::SmuConfig;
//!
//! let config = SmuConfig::load()?;
//! println!("Instrument: {}", config.instrument.resource);
//! # Ok::<(), smu_daq::error::SmuError>(())
//! ```

use crate::error::{AppResult, SmuError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/smu_daq.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SMUDAQ_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SmuConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Instrument connection
    #[serde(default)]
    pub instrument: InstrumentConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Instrument connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    /// VISA resource string (e.g., "GPIB0::3::INSTR")
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Drive the simulated instrument instead of real hardware
    #[serde(default = "default_mock")]
    pub mock: bool,
    /// VISA timeout in milliseconds, applied to opening and to every read and write
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Appended to every command written to the instrument
    #[serde(default = "default_write_terminator")]
    pub write_terminator: String,
    /// Load resistance of the simulated instrument, in ohms
    #[serde(default = "default_load_ohms")]
    pub simulated_load_ohms: f64,
}

fn default_name() -> String {
    "smu_daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resource() -> String {
    "GPIB0::3::INSTR".to_string()
}

fn default_mock() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_write_terminator() -> String {
    "\n".to_string()
}

fn default_load_ohms() -> f64 {
    1_000.0
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            mock: default_mock(),
            timeout_ms: default_timeout_ms(),
            write_terminator: default_write_terminator(),
            simulated_load_ohms: default_load_ohms(),
        }
    }
}

impl InstrumentConfig {
    /// I/O timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SmuConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment, then validate.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    ///
    /// # Errors
    /// `Config` if a source cannot be parsed, `Configuration` if the merged
    /// values fail [`validate`](Self::validate).
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values figment cannot check by type alone.
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(SmuError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.instrument.resource.trim().is_empty() {
            return Err(SmuError::Configuration(
                "instrument.resource cannot be empty".to_string(),
            ));
        }

        if self.instrument.timeout_ms == 0 {
            return Err(SmuError::Configuration(
                "instrument.timeout_ms must be > 0".to_string(),
            ));
        }

        let load = self.instrument.simulated_load_ohms;
        if !load.is_finite() || load <= 0.0 {
            return Err(SmuError::Configuration(format!(
                "instrument.simulated_load_ohms must be a positive number, got {load}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SmuConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.instrument.mock);
        assert_eq!(config.instrument.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = SmuConfig::default();
        config.application.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_invalid_instrument_values() {
        let mut config = SmuConfig::default();
        config.instrument.resource = "  ".to_string();
        assert!(matches!(config.validate(), Err(SmuError::Configuration(_))));

        let mut config = SmuConfig::default();
        config.instrument.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(SmuError::Configuration(_))));

        let mut config = SmuConfig::default();
        config.instrument.simulated_load_ohms = -5.0;
        assert!(matches!(config.validate(), Err(SmuError::Configuration(_))));
    }

    // Jail serializes tests that read the process environment.
    #[test]
    fn test_load_from_file() {
        Jail::expect_with(|_jail| {
            let mut file = tempfile::NamedTempFile::new().map_err(|e| e.to_string())?;
            writeln!(
                file,
                r#"
[application]
log_level = "debug"

[instrument]
resource = "GPIB0::24::INSTR"
mock = false
timeout_ms = 2000
"#
            )
            .map_err(|e| e.to_string())?;

            let config = SmuConfig::load_from(file.path()).map_err(|e| e.to_string())?;
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.application.name, "smu_daq");
            assert_eq!(config.instrument.resource, "GPIB0::24::INSTR");
            assert!(!config.instrument.mock);
            assert_eq!(config.instrument.timeout_ms, 2000);
            assert_eq!(config.instrument.write_terminator, "\n");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        Jail::expect_with(|jail| {
            jail.create_file("smu.toml", "[instrument]\ntimeout_ms = 0")?;
            assert!(matches!(
                SmuConfig::load_from("smu.toml"),
                Err(SmuError::Configuration(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "smu.toml",
                r#"
[instrument]
resource = "GPIB0::3::INSTR"
"#,
            )?;
            jail.set_env("SMUDAQ_INSTRUMENT__RESOURCE", "TCPIP0::10.0.0.7::INSTR");
            jail.set_env("SMUDAQ_APPLICATION__LOG_LEVEL", "warn");

            let config = SmuConfig::load_from("smu.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.instrument.resource, "TCPIP0::10.0.0.7::INSTR");
            assert_eq!(config.application.log_level, "warn");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = SmuConfig::load_from("does_not_exist.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, SmuConfig::default());
            Ok(())
        });
    }
}
