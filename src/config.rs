//! Persisted configuration.
//!
//! The record is a flat key/value map: three mode flags plus every channel field under an `in1_` or `in2_`
//! prefix. Register values are stored as the hardware holds them (setpoint in digital units, limits as deltas
//! about [`OUT_ZERO`](crate::calibration::OUT_ZERO)), the setpoint table as the volts the operator entered.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    channel::PidChannel,
    driver::PidDriver,
    error::Result,
    mode::EnabledFlags,
    register::{AnalogInput, ChannelId, OutputDirect, PauseGains, PidRegister, RegisterValue},
    sequencer::SetpointTable,
};

/// Section of the instrument's config document holding our record.
pub const DEFAULT_SECTION: &str = "blacs";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config format error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected a key/value map at {0}")]
    NotAMap(String),
}

/// Stored settings of one channel.
///
/// `paused` is not stored. A session always starts with both channels paused, see
/// [`PidController::from_config`](crate::controller::PidController::from_config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub p: f64,
    pub i: f64,
    pub ival: f64,
    pub differential_mode: bool,
    pub input: AnalogInput,
    pub output_direct: OutputDirect,
    /// Digital delta about `OUT_ZERO`.
    pub max_voltage: f64,
    /// Digital delta about `OUT_ZERO`.
    pub min_voltage: f64,
    pub pause_gains: PauseGains,
    /// Digital units.
    pub setpoint: f64,
    pub use_setpoint_sequence: bool,
    pub setpoint_index: u8,
    /// Volts.
    pub digital_setpoint_array: SetpointTable,
}

/// The whole persisted record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRecord {
    pub flags: EnabledFlags,
    pub in1: ChannelConfig,
    pub in2: ChannelConfig,
}

fn prefix(channel: ChannelId) -> String {
    format!("{}_", channel.as_ref())
}

fn as_map(value: Value, context: &str) -> core::result::Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAMap(context.to_string())),
    }
}

impl ConfigRecord {
    pub fn channel(&self, id: ChannelId) -> &ChannelConfig {
        match id {
            ChannelId::In1 => &self.in1,
            ChannelId::In2 => &self.in2,
        }
    }

    /// Flatten to `set_*_enabled` and `in1_*` / `in2_*` keys.
    pub fn to_map(&self) -> core::result::Result<Map<String, Value>, ConfigError> {
        let mut map = as_map(serde_json::to_value(self.flags)?, "flags")?;
        for id in [ChannelId::In1, ChannelId::In2] {
            let fields = as_map(serde_json::to_value(self.channel(id))?, id.as_ref())?;
            let prefix = prefix(id);
            for (key, value) in fields {
                map.insert(format!("{prefix}{key}"), value);
            }
        }
        Ok(map)
    }

    /// Rebuild from a flat map. Unknown keys are ignored, missing ones are an error.
    pub fn from_map(map: &Map<String, Value>) -> core::result::Result<Self, ConfigError> {
        let channel = |id: ChannelId| -> core::result::Result<ChannelConfig, ConfigError> {
            let prefix = prefix(id);
            let fields: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|k| (k.to_string(), v.clone())))
                .collect();
            Ok(serde_json::from_value(Value::Object(fields))?)
        };
        Ok(Self {
            flags: serde_json::from_value(Value::Object(map.clone()))?,
            in1: channel(ChannelId::In1)?,
            in2: channel(ChannelId::In2)?,
        })
    }
}

/// Where the record is kept between sessions.
pub trait ConfigStore {
    /// Return the stored record, or `None` if there is none yet.
    fn load(&mut self) -> core::result::Result<Option<ConfigRecord>, ConfigError>;

    /// Replace the stored record.
    fn save(&mut self, record: &ConfigRecord) -> core::result::Result<(), ConfigError>;
}

/// Keeps the record as one section of a JSON document, leaving the other sections alone.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    section: String,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_section(path, DEFAULT_SECTION)
    }

    pub fn with_section(path: impl AsRef<Path>, section: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            section: section.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> core::result::Result<Option<Map<String, Value>>, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_json::from_str(&text)?;
        Ok(Some(as_map(document, &self.path.display().to_string())?))
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&mut self) -> core::result::Result<Option<ConfigRecord>, ConfigError> {
        let Some(mut document) = self.read_document()? else {
            debug!(path = %self.path.display(), "no config file");
            return Ok(None);
        };
        let Some(section) = document.remove(&self.section) else {
            debug!(section = %self.section, "no config section");
            return Ok(None);
        };
        let section = as_map(section, &self.section)?;
        ConfigRecord::from_map(&section).map(Some)
    }

    fn save(&mut self, record: &ConfigRecord) -> core::result::Result<(), ConfigError> {
        let mut document = self.read_document()?.unwrap_or_default();
        document.insert(self.section.clone(), Value::Object(record.to_map()?));
        let text = serde_json::to_string_pretty(&Value::Object(document))?;
        fs::write(&self.path, text)?;
        info!(path = %self.path.display(), section = %self.section, "config written");
        Ok(())
    }
}

/// Keeps the record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub record: Option<ConfigRecord>,
}

impl ConfigStore for MemoryStore {
    fn load(&mut self) -> core::result::Result<Option<ConfigRecord>, ConfigError> {
        Ok(self.record.clone())
    }

    fn save(&mut self, record: &ConfigRecord) -> core::result::Result<(), ConfigError> {
        self.record = Some(record.clone());
        Ok(())
    }
}

impl<D: PidDriver> PidChannel<'_, D> {
    /// Capture this channel's registers as they are now.
    pub fn read_config(&mut self) -> Result<ChannelConfig, D::Error> {
        Ok(ChannelConfig {
            p: self.read(PidRegister::P)?,
            i: self.read(PidRegister::I)?,
            ival: self.read(PidRegister::Ival)?,
            differential_mode: self.read(PidRegister::DifferentialModeEnabled)?,
            input: self.read(PidRegister::Input)?,
            output_direct: self.read(PidRegister::OutputDirect)?,
            max_voltage: self.read(PidRegister::MaxVoltage)?,
            min_voltage: self.read(PidRegister::MinVoltage)?,
            pause_gains: self.read(PidRegister::PauseGains)?,
            setpoint: self.read(PidRegister::Setpoint)?,
            use_setpoint_sequence: self.read(PidRegister::UseSetpointSequence)?,
            setpoint_index: self.read(PidRegister::SetpointIndex)?,
            digital_setpoint_array: self.state.setpoint_table,
        })
    }

    /// Write a stored configuration to this channel. Values go to the registers as stored.
    pub fn apply_config(&mut self, config: &ChannelConfig) -> Result<(), D::Error> {
        const OP: &str = "apply_config";
        let steps: [(PidRegister, RegisterValue); 12] = [
            (PidRegister::Input, config.input.into()),
            (PidRegister::OutputDirect, config.output_direct.into()),
            (PidRegister::DifferentialModeEnabled, config.differential_mode.into()),
            (PidRegister::Setpoint, config.setpoint.into()),
            (PidRegister::PauseGains, config.pause_gains.into()),
            (PidRegister::MaxVoltage, config.max_voltage.into()),
            (PidRegister::MinVoltage, config.min_voltage.into()),
            (PidRegister::Ival, config.ival.into()),
            (PidRegister::P, config.p.into()),
            (PidRegister::I, config.i.into()),
            (PidRegister::UseSetpointSequence, config.use_setpoint_sequence.into()),
            (PidRegister::SetpointIndex, config.setpoint_index.into()),
        ];
        for (register, value) in steps {
            self.write(register, value)
                .map_err(|e| e.incomplete(OP, register.into()))?;
        }
        self.set_setpoint_array(config.digital_setpoint_array.as_array())
            .map_err(|e| e.incomplete(OP, "digital_setpoint_array"))?;
        Ok(())
    }
}
