//! This module is used to define the registers of one hardware PID block, and the value types they hold.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// The named attributes exposed by the driver for each PID block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, AsRefStr, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PidRegister {
    /// __R/W__ - Analog input routed to this PID.
    ///
    /// See [`AnalogInput`].
    Input,
    /// __R/W__ - Analog output driven by this PID.
    ///
    /// See [`OutputDirect`].
    OutputDirect,
    /// __R/W__ - Scalar setpoint, digital units.
    Setpoint,
    /// __R/W__ - Proportional gain.
    P,
    /// __R/W__ - Integral gain.
    I,
    /// __R/W__ - Integrator accumulator, digital units.
    Ival,
    /// __R/W__ - Lower output limit, digital delta about [`OUT_ZERO`](crate::calibration::OUT_ZERO).
    MinVoltage,
    /// __R/W__ - Upper output limit, digital delta about [`OUT_ZERO`](crate::calibration::OUT_ZERO).
    MaxVoltage,
    /// __R/W__ - Gain terms that stay active while paused.
    ///
    /// See [`PauseGains`].
    PauseGains,
    /// __R/W__ - Open loop / integrator hold.
    /// * `false` - Active correction.
    /// * `true` - Paused.
    Paused,
    /// __R/W__ - Use the difference of both analog inputs as the input signal.
    DifferentialModeEnabled,
    /// __R/W__ - Drive the PID from the setpoint table instead of [`PidRegister::Setpoint`].
    UseSetpointSequence,
    /// __R/W__ - Current setpoint table index.
    ///
    /// Range = 0-15.
    SetpointIndex,
    /// __R__ - Setpoint table entry at the current index, digital units.
    SetpointInSequence,
    /// __R__ - Set when the setpoint index wrapped from 15 back to 0.
    SequenceWrapFlag,
}

impl PidRegister {
    /// Whether the register accepts writes.
    pub const fn is_writable(&self) -> bool {
        !matches!(self, Self::SetpointInSequence | Self::SequenceWrapFlag)
    }
}

/// Identifies one of the two hardware PID blocks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    In1,
    In2,
}

impl ChannelId {
    /// Array index of this channel, for per-channel tables.
    pub const fn index(&self) -> usize {
        match self {
            Self::In1 => 0,
            Self::In2 => 1,
        }
    }

    /// The analog input this channel is wired to in digital setpoint mode.
    pub const fn default_input(&self) -> AnalogInput {
        match self {
            Self::In1 => AnalogInput::In1,
            Self::In2 => AnalogInput::In2,
        }
    }

    /// The analog output this channel drives in digital setpoint mode.
    pub const fn default_output(&self) -> OutputDirect {
        match self {
            Self::In1 => OutputDirect::Out1,
            Self::In2 => OutputDirect::Out2,
        }
    }
}

/// Physical analog inputs of the instrument.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnalogInput {
    In1,
    In2,
}

/// Physical analog output driven by a PID, or disconnected.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputDirect {
    Out1,
    Out2,
    Off,
}

/// Which gain terms remain active while a channel is paused.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PauseGains {
    /// Both terms held. This is the safe state.
    #[default]
    Pi,
    P,
    I,
    Off,
}

/// A value as held by one driver register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    Float(f64),
    Flag(bool),
    Index(u8),
    Input(AnalogInput),
    Output(OutputDirect),
    PauseGains(PauseGains),
}

impl From<f64> for RegisterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for RegisterValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<u8> for RegisterValue {
    fn from(value: u8) -> Self {
        Self::Index(value)
    }
}

impl From<AnalogInput> for RegisterValue {
    fn from(value: AnalogInput) -> Self {
        Self::Input(value)
    }
}

impl From<OutputDirect> for RegisterValue {
    fn from(value: OutputDirect) -> Self {
        Self::Output(value)
    }
}

impl From<PauseGains> for RegisterValue {
    fn from(value: PauseGains) -> Self {
        Self::PauseGains(value)
    }
}

impl TryFrom<RegisterValue> for f64 {
    type Error = ();
    fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
        match value {
            RegisterValue::Float(v) => Ok(v),
            // The setpoint index is also readable as a number.
            RegisterValue::Index(v) => Ok(v as f64),
            _ => Err(()),
        }
    }
}

impl TryFrom<RegisterValue> for bool {
    type Error = ();
    fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
        match value {
            RegisterValue::Flag(v) => Ok(v),
            _ => Err(()),
        }
    }
}

impl TryFrom<RegisterValue> for u8 {
    type Error = ();
    fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
        match value {
            RegisterValue::Index(v) => Ok(v),
            _ => Err(()),
        }
    }
}

impl TryFrom<RegisterValue> for AnalogInput {
    type Error = ();
    fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
        match value {
            RegisterValue::Input(v) => Ok(v),
            _ => Err(()),
        }
    }
}

impl TryFrom<RegisterValue> for OutputDirect {
    type Error = ();
    fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
        match value {
            RegisterValue::Output(v) => Ok(v),
            _ => Err(()),
        }
    }
}

impl TryFrom<RegisterValue> for PauseGains {
    type Error = ();
    fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
        match value {
            RegisterValue::PauseGains(v) => Ok(v),
            _ => Err(()),
        }
    }
}
