//! This crate provides a controller for the two hardware PID blocks of a Red Pitaya running the pyrpl FPGA image,
//! as used to stabilise laser power and similar analog loops.
//!
//! It talks to the instrument through any implementation of [`driver::PidDriver`], and adds on top:
//! * Per-channel two-point calibration between volts and the instrument's digital setpoint units.
//! * The three mutually exclusive setpoint sources: `analog_setpoint`, `digital_setpoint_in1` and
//!   `digital_setpoint_in2`.
//! * The 16 entry setpoint sequencer of each digital channel.
//! * All-or-nothing status snapshots and a time windowed error trace for display.
//! * Persisted configuration and per-shot parameters for buffered runs.
//!
//! Calls are synchronous. The crate logs through [`tracing`] and installs no subscriber.
//!
//! Analog front end ranges:
//! * Output: [`OUT_MIN`](calibration::OUT_MIN) to [`OUT_MAX`](calibration::OUT_MAX) volts.
//! * Setpoint table: 16 entries.

pub mod calibration;
pub mod channel;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod mode;
pub mod parse;
pub mod register;
pub mod sequencer;
pub mod shot;
pub mod status;

pub use controller::PidController;
pub use driver::PidDriver;
pub use error::{Error, Result};

#[cfg(test)]
mod mock_driver;
