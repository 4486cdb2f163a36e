//! The hardware seam.
//!
//! You can drive a [`PidController`](crate::controller::PidController) with anything that implements
//! [`PidDriver`]: a network adapter talking to the instrument, or the in-memory mock used by the tests. The
//! driver is treated as the source of truth. A written value may come back clamped or quantised, so callers
//! always read a register back after writing it.

use crate::register::{AnalogInput, ChannelId, PidRegister, RegisterValue};

/// Number of entries in the hardware setpoint table.
pub const SEQUENCE_LENGTH: usize = 16;

/// Register level access to the two PID blocks of the instrument.
///
/// Calls are synchronous and are never interleaved by this crate.
pub trait PidDriver {
    /// Error raised by the transport or the instrument.
    type Error: core::fmt::Debug + core::fmt::Display;

    /// Read a register of one PID block.
    fn read_register(
        &mut self,
        channel: ChannelId,
        register: PidRegister,
    ) -> Result<RegisterValue, Self::Error>;

    /// Write a register of one PID block.
    fn write_register(
        &mut self,
        channel: ChannelId,
        register: PidRegister,
        value: RegisterValue,
    ) -> Result<(), Self::Error>;

    /// Load the setpoint table of one PID block, digital units.
    fn set_setpoint_array(
        &mut self,
        channel: ChannelId,
        values: &[f64; SEQUENCE_LENGTH],
    ) -> Result<(), Self::Error>;

    /// Set the setpoint index to 0 and clear the wrap flag.
    fn reset_sequence_index(&mut self, channel: ChannelId) -> Result<(), Self::Error>;

    /// Advance the setpoint index by one, raising the wrap flag when it wraps back to 0.
    fn manually_change_setpoint(&mut self, channel: ChannelId) -> Result<(), Self::Error>;

    /// Sample the voltage currently present on an analog input, digital units.
    fn read_input_voltage(&mut self, input: AnalogInput) -> Result<f64, Self::Error>;
}
