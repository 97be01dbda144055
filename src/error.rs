//! Custom error types for the driver.
//!
//! `SmuError` is the single error type returned by the public API. It wraps the
//! more specific failure enums so callers can match on the category they care
//! about:
//!
//! - **`Validation`**: a source level, level list or source setting was rejected
//!   locally. Raised before any command reaches the instrument.
//! - **`Protocol`**: the reply buffer could not be decoded as the instrument's
//!   5-field stride, or it decoded to the wrong number of samples.
//! - **`Precondition`**: an operation was called out of order (configuring
//!   before the reset sequence, enabling output or fetching before configuring).
//! - **`Channel`**: the command channel itself failed (VISA error, scripted
//!   failure, simulated device with nothing to return).
//! - **`Io`**: a VISA read or write failed or ran past its timeout.
//! - **`Config`** / **`Configuration`**: loading or validating the TOML/env
//!   configuration failed.
//!
//! Nothing here is retried. A failed call leaves the physical instrument in an
//! unknown state relative to the driver; re-run the reset sequence or
//! reconfigure to recover.

use crate::instrument::SourceFunction;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type AppResult<T> = std::result::Result<T, SmuError>;

#[derive(Error, Debug)]
pub enum SmuError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for SmuError {
    fn from(err: figment::Error) -> Self {
        SmuError::Config(Box::new(err))
    }
}

/// Rejection of a source level or source setting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{function} level {value} at index {index} is not a finite number")]
    NotFinite {
        function: SourceFunction,
        index: usize,
        value: f64,
    },

    #[error("{function} level {value} at index {index} exceeds ceiling of {ceiling}")]
    ExceedsCeiling {
        function: SourceFunction,
        index: usize,
        value: f64,
        ceiling: f64,
    },

    #[error("{function} level list is empty")]
    EmptyList { function: SourceFunction },

    #[error("setting '{name}' must be finite and positive, got {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

/// Failure to decode a reply buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("field {index} of reply is not numeric: '{field}'")]
    NonNumericField { index: usize, field: String },

    #[error("reply has {fields} fields, not a multiple of {stride}")]
    StrideMismatch { fields: usize, stride: usize },

    #[error("reply holds {actual} readings, expected {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Rejection of sweep generator inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    #[error("sweep parameter '{name}' is not finite: {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("sweep step must be positive, got {0}")]
    NonPositiveStep(f64),

    #[error("final voltage {final_voltage} is below initial voltage {initial_voltage}")]
    DescendingRange {
        initial_voltage: f64,
        final_voltage: f64,
    },

    #[error("sweep would hold more than {limit} points")]
    TooManyPoints { limit: usize },
}
