//! Setpoint source selection across the two channels.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::register::ChannelId;

/// The three mutually exclusive ways the instrument can be run.
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
pub enum SetpointSource {
    /// `in1` regulates against the analog voltage present on `in2`.
    #[strum(serialize = "analog_setpoint")]
    #[serde(rename = "analog_setpoint")]
    AnalogSetpoint,
    /// `in1` regulates against its own digital setpoint.
    #[default]
    #[strum(serialize = "digital_setpoint_in1")]
    #[serde(rename = "digital_setpoint_in1")]
    DigitalIn1,
    /// `in2` regulates against its own digital setpoint.
    #[strum(serialize = "digital_setpoint_in2")]
    #[serde(rename = "digital_setpoint_in2")]
    DigitalIn2,
}

impl SetpointSource {
    /// The channel that channel operations are applied to in this mode.
    ///
    /// In analog mode `in1` carries the loop and `in2` only serves as the reference input.
    pub const fn active_channel(&self) -> ChannelId {
        match self {
            Self::AnalogSetpoint | Self::DigitalIn1 => ChannelId::In1,
            Self::DigitalIn2 => ChannelId::In2,
        }
    }

    /// The channel whose setpoint table is in use, if any.
    pub const fn digital_channel(&self) -> Option<ChannelId> {
        match self {
            Self::AnalogSetpoint => None,
            Self::DigitalIn1 => Some(ChannelId::In1),
            Self::DigitalIn2 => Some(ChannelId::In2),
        }
    }
}

/// The three enabled flags as presented to callers and stored in the config record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledFlags {
    pub set_analog_enabled: bool,
    pub set_in1_enabled: bool,
    pub set_in2_enabled: bool,
}

impl EnabledFlags {
    /// Resolve stored flags to a setpoint source. Analog takes precedence over `in1`, `in1` over `in2`.
    pub fn resolve(&self) -> Option<SetpointSource> {
        if self.set_analog_enabled {
            Some(SetpointSource::AnalogSetpoint)
        } else if self.set_in1_enabled {
            Some(SetpointSource::DigitalIn1)
        } else if self.set_in2_enabled {
            Some(SetpointSource::DigitalIn2)
        } else {
            None
        }
    }
}

/// Tracks the current setpoint source and which mode, if any, is enabled.
///
/// The enabled mode is held as a single optional value, so at most one flag can ever be true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelector {
    source: SetpointSource,
    enabled: Option<SetpointSource>,
}

impl Default for ModeSelector {
    /// `digital_setpoint_in1`, enabled.
    fn default() -> Self {
        Self {
            source: SetpointSource::DigitalIn1,
            enabled: Some(SetpointSource::DigitalIn1),
        }
    }
}

impl ModeSelector {
    /// Restore a selector from stored flags.
    ///
    /// With no flag set the default source is selected but left disabled.
    pub fn from_flags(flags: EnabledFlags) -> Self {
        match flags.resolve() {
            Some(source) => Self {
                source,
                enabled: Some(source),
            },
            None => Self {
                source: SetpointSource::default(),
                enabled: None,
            },
        }
    }

    pub fn source(&self) -> SetpointSource {
        self.source
    }

    /// The channel operations are dispatched to.
    pub fn active_channel(&self) -> ChannelId {
        self.source.active_channel()
    }

    /// Switch to a new source. Selecting a source also enables it.
    pub(crate) fn select(&mut self, source: SetpointSource) {
        self.source = source;
        self.enabled = Some(source);
    }

    /// Mark the current source as enabled or disabled.
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled.then_some(self.source);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some()
    }

    pub fn flags(&self) -> EnabledFlags {
        EnabledFlags {
            set_analog_enabled: self.enabled == Some(SetpointSource::AnalogSetpoint),
            set_in1_enabled: self.enabled == Some(SetpointSource::DigitalIn1),
            set_in2_enabled: self.enabled == Some(SetpointSource::DigitalIn2),
        }
    }
}
