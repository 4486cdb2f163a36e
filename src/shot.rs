//! Per-shot parameters for buffered runs.
//!
//! A sequence compiler fills a [`ShotParametersBuilder`], the result is serialised alongside the shot and the
//! controller reads it back once in
//! [`PidController::transition_to_buffered`](crate::controller::PidController::transition_to_buffered).
//!
//! ```json
//! { "in1": { "digital_setpoint_array": [0.1, 0.2, 0.3] } }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{register::ChannelId, sequencer::SetpointTable};

/// Parameters for one channel. Anything left out stays as it is on the instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelShot {
    /// Volts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_setpoint_array: Option<SetpointTable>,
}

/// Use [`ShotParametersBuilder`] to create these on the compile side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in1: Option<ChannelShot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in2: Option<ChannelShot>,
}

impl ShotParameters {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelShot> {
        match id {
            ChannelId::In1 => self.in1.as_ref(),
            ChannelId::In2 => self.in2.as_ref(),
        }
    }

    /// The setpoint table to load into a channel, if the shot carries one.
    pub fn setpoint_array(&self, id: ChannelId) -> Option<&SetpointTable> {
        self.channel(id)?.digital_setpoint_array.as_ref()
    }
}

/// Use this type to create shot parameters.
#[derive(Debug, Clone, Default)]
pub struct ShotParametersBuilder {
    in1: Option<ChannelShot>,
    in2: Option<ChannelShot>,
}

impl ShotParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the setpoint table of a channel, volts. Padded or truncated to 16 entries.
    pub fn set_setpoint_array(mut self, channel: ChannelId, values: &[f64]) -> Self {
        let slot = match channel {
            ChannelId::In1 => &mut self.in1,
            ChannelId::In2 => &mut self.in2,
        };
        slot.get_or_insert_with(ChannelShot::default).digital_setpoint_array =
            Some(SetpointTable::from_slice(values));
        self
    }

    /// Let's build it!
    pub fn build(self) -> Result<ShotParameters, ShotBuilderError> {
        for (id, shot) in [(ChannelId::In1, &self.in1), (ChannelId::In2, &self.in2)] {
            let table = shot.as_ref().and_then(|s| s.digital_setpoint_array.as_ref());
            if let Some(table) = table {
                if table.as_array().iter().any(|v| !v.is_finite()) {
                    return Err(ShotBuilderError::NotFinite(id));
                }
            }
        }
        Ok(ShotParameters {
            in1: self.in1,
            in2: self.in2,
        })
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ShotBuilderError {
    #[error("Setpoint array for {0} contains a non-finite value")]
    NotFinite(ChannelId),
}
