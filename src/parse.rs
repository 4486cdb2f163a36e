//! Validation of caller supplied text and numbers.
//!
//! Callers such as a control panel hand us what the operator typed. These helpers turn that into typed values
//! or a [`ValidationError`], before anything reaches the hardware.

use core::str::FromStr;

use crate::{driver::SEQUENCE_LENGTH, error::ValidationError};

/// Reject NaN and infinities.
pub fn ensure_finite(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NotFinite)
    }
}

/// Parse a single finite number.
pub fn parse_value(text: &str) -> Result<f64, ValidationError> {
    let trimmed = text.trim();
    let value = trimmed
        .parse::<f64>()
        .map_err(|_| ValidationError::NotANumber(trimmed.to_string()))?;
    ensure_finite(value)
}

/// Parse a setpoint index. Only 0-15 is accepted here, unlike the masking done by the controller.
pub fn parse_index(text: &str) -> Result<u8, ValidationError> {
    let trimmed = text.trim();
    let index = trimmed
        .parse::<i64>()
        .map_err(|_| ValidationError::NotANumber(trimmed.to_string()))?;
    if (0..SEQUENCE_LENGTH as i64).contains(&index) {
        Ok(index as u8)
    } else {
        Err(ValidationError::IndexOutOfRange(index))
    }
}

/// Parse a list of 1 to 16 numbers separated by commas and/or whitespace. Surrounding brackets are ignored.
pub fn parse_setpoint_array(text: &str) -> Result<Vec<f64>, ValidationError> {
    let inner = text
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    let values = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(parse_value)
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err(ValidationError::EmptyArray);
    }
    if values.len() > SEQUENCE_LENGTH {
        return Err(ValidationError::ArrayTooLong(values.len()));
    }
    Ok(values)
}

/// Parse one of the named register options, e.g. `"out1"` or `"pi"`.
pub fn parse_name<T: FromStr>(kind: &'static str, text: &str) -> Result<T, ValidationError> {
    let trimmed = text.trim();
    T::from_str(trimmed).map_err(|_| ValidationError::UnknownName {
        kind,
        value: trimmed.to_string(),
    })
}
