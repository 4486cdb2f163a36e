//! Status snapshots and the error trace.
//!
//! These are the read-only views polled by a control panel. A snapshot is all or nothing: if any single
//! register read fails the caller gets one error record, never a partly filled snapshot.

use std::collections::VecDeque;

use serde::Serialize;

use crate::{
    calibration::limit_to_physical,
    channel::PidChannel,
    driver::PidDriver,
    error::Result,
    mode::{EnabledFlags, SetpointSource},
    register::{AnalogInput, ChannelId, OutputDirect, PauseGains, PidRegister},
    sequencer::SetpointTable,
};

/// Width of the error trace window, seconds.
pub const ROLLING_WINDOW_SECS: f64 = 5.0;

/// Every register of one channel, in caller units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub input: AnalogInput,
    pub output_direct: OutputDirect,
    /// Volts.
    pub setpoint: f64,
    pub p: f64,
    pub i: f64,
    /// Digital units.
    pub ival: f64,
    /// Absolute volts.
    pub min_voltage: f64,
    /// Absolute volts.
    pub max_voltage: f64,
    pub pause_gains: PauseGains,
    pub paused: bool,
    pub differential_mode_enabled: bool,
    pub use_setpoint_sequence: bool,
    pub setpoint_index: u8,
    /// Volts.
    pub setpoint_in_sequence: f64,
    pub sequence_wrap_flag: bool,
    /// Host side copy of the setpoint table, volts.
    pub digital_setpoint_array: SetpointTable,
}

impl<D: PidDriver> PidChannel<'_, D> {
    /// Read every register of this channel.
    pub fn read_status(&mut self) -> Result<ChannelStatus, D::Error> {
        let cal = self.calibration();
        let setpoint: f64 = self.read(PidRegister::Setpoint)?;
        let min_voltage: f64 = self.read(PidRegister::MinVoltage)?;
        let max_voltage: f64 = self.read(PidRegister::MaxVoltage)?;
        let position = self.read_sequence_position()?;
        Ok(ChannelStatus {
            channel: self.id,
            input: self.read(PidRegister::Input)?,
            output_direct: self.read(PidRegister::OutputDirect)?,
            setpoint: cal.to_physical(setpoint),
            p: self.read(PidRegister::P)?,
            i: self.read(PidRegister::I)?,
            ival: self.read(PidRegister::Ival)?,
            min_voltage: limit_to_physical(min_voltage),
            max_voltage: limit_to_physical(max_voltage),
            pause_gains: self.read(PidRegister::PauseGains)?,
            paused: self.read(PidRegister::Paused)?,
            differential_mode_enabled: self.read(PidRegister::DifferentialModeEnabled)?,
            use_setpoint_sequence: self.read(PidRegister::UseSetpointSequence)?,
            setpoint_index: position.setpoint_index,
            setpoint_in_sequence: position.setpoint_in_sequence,
            sequence_wrap_flag: position.sequence_wrap_flag,
            digital_setpoint_array: self.state.setpoint_table,
        })
    }
}

/// Consistent picture of the instrument for display.
///
/// Holds the active channel, or both channels in analog mode where `in2` is the reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub setpoint_source: SetpointSource,
    #[serde(flatten)]
    pub enabled: EnabledFlags,
    pub channels: Vec<ChannelStatus>,
}

impl StatusSnapshot {
    /// Status of one channel, if it is part of this snapshot.
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelStatus> {
        self.channels.iter().find(|c| c.channel == id)
    }
}

/// Result of a status poll. Polls never fail, errors are reported in-band.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusReport {
    Status(StatusSnapshot),
    Error { error: String },
}

impl StatusReport {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// One sample of the loop error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorPoint {
    /// Seconds since the controller was created.
    pub time: f64,
    /// Input minus effective setpoint, digital units.
    pub error: f64,
    /// Integrator value, digital units.
    pub ival: f64,
}

/// Result of an error point poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorPointReport {
    Point(ErrorPoint),
    Error { error: String },
}

/// Time windowed trace of the most recent error points.
///
/// The oldest points are dropped while the newest is more than [`ROLLING_WINDOW_SECS`] later than the oldest.
/// Time is the only bound, so the length follows the polling rate.
#[derive(Debug, Default)]
pub struct RollingBuffer {
    points: VecDeque<ErrorPoint>,
}

impl RollingBuffer {
    pub fn new() -> Self {
        Self {
            points: VecDeque::new(),
        }
    }

    /// Append a point and evict whatever fell out of the window.
    pub fn push(&mut self, point: ErrorPoint) {
        self.points.push_back(point);
        let newest = point.time;
        while let Some(oldest) = self.points.front().map(|p| p.time) {
            if newest - oldest > ROLLING_WINDOW_SECS {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorPoint> {
        self.points.iter()
    }

    /// Points with their time shifted so the oldest sits at 0, for plotting.
    pub fn relative(&self) -> impl Iterator<Item = ErrorPoint> + '_ {
        let origin = self.points.front().map(|p| p.time).unwrap_or_default();
        self.points.iter().map(move |p| ErrorPoint {
            time: p.time - origin,
            ..*p
        })
    }
}
