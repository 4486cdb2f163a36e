//! Our error types for the PID controller.

use thiserror::Error;

use crate::{config::ConfigError, mode::SetpointSource};

pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Custom error type for PID channel operations, generic over the driver's own error type.
#[derive(Error, Debug)]
pub enum Error<E> {
    #[error("Hardware error: {0}")]
    Hardware(E),
    #[error("Invalid value: {0}")]
    Validation(ValidationError),
    #[error("{operation} is not available with setpoint source {mode}")]
    Mode {
        operation: &'static str,
        mode: SetpointSource,
    },
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("{operation} stopped at {step}, earlier steps remain applied: {cause}")]
    Incomplete {
        operation: &'static str,
        step: &'static str,
        cause: String,
    },
    #[error("Configuration error: {0}")]
    Config(ConfigError),
}

impl<E: core::fmt::Display> Error<E> {
    /// Mark this error as having interrupted a multi-step operation.
    pub(crate) fn incomplete(self, operation: &'static str, step: &'static str) -> Self {
        tracing::error!(operation, step, error = %self, "operation interrupted");
        Error::Incomplete {
            operation,
            step,
            cause: self.to_string(),
        }
    }
}

impl<E> From<ValidationError> for Error<E> {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl<E> From<ConfigError> for Error<E> {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Rejected caller input. Raised before anything is written to hardware.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("\"{0}\" is not a number")]
    NotANumber(String),
    #[error("Value must be finite")]
    NotFinite,
    #[error("Min voltage {min} must be less than max voltage {max}")]
    LimitsOutOfOrder { min: f64, max: f64 },
    #[error("Array too long ({0} elements, max 16)")]
    ArrayTooLong(usize),
    #[error("Array is empty")]
    EmptyArray,
    #[error("Index {0} is outside 0-15")]
    IndexOutOfRange(i64),
    #[error("Unknown {kind} \"{value}\"")]
    UnknownName { kind: &'static str, value: String },
}
