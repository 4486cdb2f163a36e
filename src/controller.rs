//! The operation surface of the instrument.
//!
//! A [`PidController`] owns the driver, the two channels' host side state and the mode selector. Channel
//! operations are dispatched to the channel the current setpoint source makes active. Calls are synchronous
//! and must not be interleaved.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    channel::{ChannelState, PidChannel, ResetReadback, SAFE_IVAL},
    config::{ConfigRecord, ConfigStore},
    driver::PidDriver,
    error::{Error, Result},
    mode::{EnabledFlags, ModeSelector, SetpointSource},
    register::{AnalogInput, ChannelId, OutputDirect, PauseGains, PidRegister},
    sequencer::{SequencePosition, SetpointTable},
    shot::ShotParameters,
    status::{ErrorPoint, ErrorPointReport, RollingBuffer, StatusReport, StatusSnapshot},
};

const BOTH: [ChannelId; 2] = [ChannelId::In1, ChannelId::In2];

/// Half width of the limit band `in2` is parked in while it serves as the analog reference, digital units.
pub const ANALOG_REFERENCE_BAND: f64 = 0.99;

/// One value per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelPair<T> {
    pub in1: T,
    pub in2: T,
}

/// You can create a PidController using any driver which implements [`PidDriver`].
///
/// Setters take and return caller units (volts for setpoints and limits) and always return the value read back
/// from the hardware.
pub struct PidController<D: PidDriver> {
    driver: D,
    mode: ModeSelector,
    channels: [ChannelState; 2],
    trace: RollingBuffer,
    started: Instant,
}

impl<D: PidDriver> PidController<D> {
    fn bare(driver: D, mode: ModeSelector) -> Self {
        Self {
            driver,
            mode,
            channels: Default::default(),
            trace: RollingBuffer::new(),
            started: Instant::now(),
        }
    }

    /// Start a session without a stored configuration.
    ///
    /// Both channels are parked in the safe state, wired to their default input/output pair, and
    /// `digital_setpoint_in1` is selected and enabled.
    pub fn new(driver: D) -> Result<Self, D::Error> {
        let mut controller = Self::bare(driver, ModeSelector::default());
        controller.safe_state_all()?;
        for id in BOTH {
            let mut channel = controller.channel(id);
            channel
                .set_input(id.default_input())
                .map_err(|e| e.incomplete("init", "input"))?;
            channel
                .set_output_direct(id.default_output())
                .map_err(|e| e.incomplete("init", "output_direct"))?;
        }
        controller.refresh_cache("init")?;
        info!(source = %controller.mode.source(), "session started with default wiring");
        Ok(controller)
    }

    /// Start a session from a stored configuration record.
    ///
    /// Both channels are parked in the safe state, then every stored field is written back. The mode is restored
    /// from the stored flags, analog taking precedence over `in1` and `in1` over `in2`.
    pub fn from_config(driver: D, record: &ConfigRecord) -> Result<Self, D::Error> {
        let mut controller = Self::bare(driver, ModeSelector::from_flags(record.flags));
        controller.safe_state_all()?;
        for id in BOTH {
            controller.channel(id).apply_config(record.channel(id))?;
        }
        controller.refresh_cache("init")?;
        info!(
            source = %controller.mode.source(),
            enabled = controller.mode.is_enabled(),
            "session started from config"
        );
        Ok(controller)
    }

    /// Start a session from whatever `store` holds, or with the defaults when it holds nothing.
    pub fn open(driver: D, store: &mut impl ConfigStore) -> Result<Self, D::Error> {
        match store.load()? {
            Some(record) => Self::from_config(driver, &record),
            None => Self::new(driver),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn setpoint_source(&self) -> SetpointSource {
        self.mode.source()
    }

    pub fn enabled_flags(&self) -> EnabledFlags {
        self.mode.flags()
    }

    /// Host side state of a channel: the setpoint table copy and the last cached status.
    pub fn channel_state(&self, id: ChannelId) -> &ChannelState {
        &self.channels[id.index()]
    }

    /// Recent error points, see [`get_error_point`](Self::get_error_point).
    pub fn error_trace(&self) -> &RollingBuffer {
        &self.trace
    }

    /// Direct access to one channel, whatever the mode.
    pub fn channel(&mut self, id: ChannelId) -> PidChannel<'_, D> {
        PidChannel::new(&mut self.driver, id, &mut self.channels[id.index()])
    }

    /// The channel the current mode dispatches to.
    fn active(&mut self) -> PidChannel<'_, D> {
        let id = self.mode.active_channel();
        self.channel(id)
    }

    /// The channel whose sequencer is in use. There is none in analog mode.
    fn sequencer(&mut self, operation: &'static str) -> Result<PidChannel<'_, D>, D::Error> {
        let source = self.mode.source();
        match source.digital_channel() {
            Some(id) => Ok(self.channel(id)),
            None => Err(Error::Mode {
                operation,
                mode: source,
            }),
        }
    }

    pub fn set_p(&mut self, value: f64) -> Result<f64, D::Error> {
        self.active().set_p(value)
    }

    pub fn set_i(&mut self, value: f64) -> Result<f64, D::Error> {
        self.active().set_i(value)
    }

    pub fn set_ival(&mut self, value: f64) -> Result<f64, D::Error> {
        self.active().set_ival(value)
    }

    /// Set the scalar setpoint of the active channel, volts.
    pub fn set_setpoint(&mut self, volts: f64) -> Result<f64, D::Error> {
        self.active().set_setpoint(volts)
    }

    /// Set the lower output limit of the active channel, absolute volts.
    pub fn set_min_voltage(&mut self, volts: f64) -> Result<f64, D::Error> {
        self.active().set_min_voltage(volts)
    }

    /// Set the upper output limit of the active channel, absolute volts.
    pub fn set_max_voltage(&mut self, volts: f64) -> Result<f64, D::Error> {
        self.active().set_max_voltage(volts)
    }

    /// Set both output limits of the active channel, absolute volts.
    pub fn set_voltage_limits(&mut self, min: f64, max: f64) -> Result<(f64, f64), D::Error> {
        self.active().set_voltage_limits(min, max)
    }

    pub fn set_input(&mut self, input: AnalogInput) -> Result<AnalogInput, D::Error> {
        self.active().set_input(input)
    }

    pub fn set_output_direct(&mut self, output: OutputDirect) -> Result<OutputDirect, D::Error> {
        self.active().set_output_direct(output)
    }

    pub fn set_pause_gains(&mut self, gains: PauseGains) -> Result<PauseGains, D::Error> {
        self.active().set_pause_gains(gains)
    }

    /// Switch the setpoint source, rewiring the channels for the new mode.
    ///
    /// Entering analog mode zeroes both channels, parks `in2` as the reference input and pauses both. Entering a
    /// digital mode only rewires that channel and turns differential mode off, gains and setpoints are left alone.
    /// Ends by re-reading both channels into the status cache. Not transactional.
    pub fn set_setpoint_source(
        &mut self,
        source: SetpointSource,
    ) -> Result<StatusSnapshot, D::Error> {
        const OP: &str = "set_setpoint_source";
        info!(from = %self.mode.source(), to = %source, "changing setpoint source");
        self.mode.select(source);

        match source.digital_channel() {
            None => self.enter_analog_mode()?,
            Some(id) => {
                let mut channel = self.channel(id);
                channel
                    .set_input(id.default_input())
                    .map_err(|e| e.incomplete(OP, "input"))?;
                channel
                    .set_output_direct(id.default_output())
                    .map_err(|e| e.incomplete(OP, "output_direct"))?;
                for id in BOTH {
                    self.channel(id)
                        .set_differential_mode(false)
                        .map_err(|e| e.incomplete(OP, "differential_mode"))?;
                }
            }
        }

        self.refresh_cache(OP)?;
        self.snapshot()
    }

    fn enter_analog_mode(&mut self) -> Result<(), D::Error> {
        const OP: &str = "set_setpoint_source";
        for id in BOTH {
            self.channel(id)
                .set_use_setpoint_sequence(false)
                .map_err(|e| e.incomplete(OP, "use_setpoint_sequence"))?;
        }

        let mut reference = self.channel(ChannelId::In2);
        reference
            .set_output_direct(OutputDirect::Off)
            .map_err(|e| e.incomplete(OP, "output_direct"))?;
        let mut lead = self.channel(ChannelId::In1);
        lead.set_output_direct(OutputDirect::Out1)
            .map_err(|e| e.incomplete(OP, "output_direct"))?;
        lead.set_input(AnalogInput::In1)
            .map_err(|e| e.incomplete(OP, "input"))?;
        self.channel(ChannelId::In2)
            .set_input(AnalogInput::In2)
            .map_err(|e| e.incomplete(OP, "input"))?;

        // The setpoint registers are unused in this mode, they are cleared to raw 0.
        for id in BOTH {
            self.channel(id)
                .write(PidRegister::Setpoint, 0.0)
                .map_err(|e| e.incomplete(OP, "setpoint"))?;
        }
        for id in BOTH {
            let mut channel = self.channel(id);
            channel.set_p(0.0).map_err(|e| e.incomplete(OP, "p"))?;
            channel.set_i(0.0).map_err(|e| e.incomplete(OP, "i"))?;
            channel.set_ival(0.0).map_err(|e| e.incomplete(OP, "ival"))?;
        }

        let mut reference = self.channel(ChannelId::In2);
        reference
            .write(PidRegister::MaxVoltage, ANALOG_REFERENCE_BAND)
            .map_err(|e| e.incomplete(OP, "max_voltage"))?;
        reference
            .write(PidRegister::MinVoltage, -ANALOG_REFERENCE_BAND)
            .map_err(|e| e.incomplete(OP, "min_voltage"))?;

        for id in BOTH {
            self.channel(id)
                .set_pause_gains(PauseGains::Pi)
                .map_err(|e| e.incomplete(OP, "pause_gains"))?;
        }
        for id in [ChannelId::In2, ChannelId::In1] {
            self.channel(id)
                .set_paused(true)
                .map_err(|e| e.incomplete(OP, "paused"))?;
        }
        self.channel(ChannelId::In1)
            .set_differential_mode(true)
            .map_err(|e| e.incomplete(OP, "differential_mode"))?;
        Ok(())
    }

    /// Resume the active channel and mark the current mode enabled. Returns whether it is now running.
    pub fn enable_pid(&mut self) -> Result<bool, D::Error> {
        let paused = self.active().set_paused(false)?;
        self.mode.set_enabled(true);
        info!(source = %self.mode.source(), "PID enabled");
        Ok(!paused)
    }

    /// Pause the active channel and mark the current mode disabled. Returns whether it is still running.
    pub fn disable_pid(&mut self) -> Result<bool, D::Error> {
        let paused = self.active().set_paused(true)?;
        self.mode.set_enabled(false);
        info!(source = %self.mode.source(), "PID disabled");
        Ok(!paused)
    }

    /// Zero gains, integrator, setpoint and setpoint table of the active channel.
    pub fn reset_pid(&mut self) -> Result<ResetReadback, D::Error> {
        let readback = self.active().reset()?;
        info!(channel = %self.mode.active_channel(), "PID reset");
        Ok(readback)
    }

    /// Pause both channels, returning both paused read-backs.
    pub fn pause_pid(&mut self) -> Result<ChannelPair<bool>, D::Error> {
        let in1 = self.channel(ChannelId::In1).set_paused(true)?;
        let in2 = self.channel(ChannelId::In2).set_paused(true)?;
        info!("both channels paused");
        Ok(ChannelPair { in1, in2 })
    }

    /// Hold both channels and drive their outputs to the bottom of the range.
    pub fn output_to_zero(&mut self) -> Result<(), D::Error> {
        const OP: &str = "output_to_zero";
        for id in BOTH {
            self.channel(id)
                .set_pause_gains(PauseGains::Pi)
                .map_err(|e| e.incomplete(OP, "pause_gains"))?;
        }
        for id in BOTH {
            self.channel(id)
                .set_paused(true)
                .map_err(|e| e.incomplete(OP, "paused"))?;
        }
        for id in BOTH {
            self.channel(id)
                .set_p(0.0)
                .map_err(|e| e.incomplete(OP, "p"))?;
        }
        for id in BOTH {
            self.channel(id)
                .set_ival(SAFE_IVAL)
                .map_err(|e| e.incomplete(OP, "ival"))?;
        }
        info!("outputs set to zero");
        Ok(())
    }

    /// Poll the hardware for display. Never fails, errors are returned in the report.
    pub fn check_hardware_status(&mut self) -> StatusReport {
        match self.snapshot() {
            Ok(snapshot) => StatusReport::Status(snapshot),
            Err(e) => {
                error!(error = %e, "hardware status check failed");
                StatusReport::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Read the active channel, or both in analog mode, and cache what was read.
    fn snapshot(&mut self) -> Result<StatusSnapshot, D::Error> {
        let source = self.mode.source();
        let active = [source.active_channel()];
        let ids: &[ChannelId] = match source {
            SetpointSource::AnalogSetpoint => &BOTH,
            _ => &active,
        };
        let channels = ids
            .iter()
            .map(|&id| self.channel(id).read_status())
            .collect::<Result<Vec<_>, _>>()?;
        for status in &channels {
            self.channels[status.channel.index()].last_status = Some(status.clone());
        }
        Ok(StatusSnapshot {
            setpoint_source: source,
            enabled: self.mode.flags(),
            channels,
        })
    }

    /// Re-read both channels into the status cache.
    fn refresh_cache(&mut self, operation: &'static str) -> Result<(), D::Error> {
        for id in BOTH {
            let status = self
                .channel(id)
                .read_status()
                .map_err(|e| e.incomplete(operation, "read_status"))?;
            self.channels[id.index()].last_status = Some(status);
        }
        debug!(operation, "status cache refreshed");
        Ok(())
    }

    /// Sample the loop error of the active channel and add it to the error trace. Never fails.
    ///
    /// In a digital mode the error is the channel's input minus its effective setpoint, which is the table entry
    /// when the sequence is in use. In analog mode it is `in1` minus `in2`. All values are digital units.
    pub fn get_error_point(&mut self) -> ErrorPointReport {
        match self.read_error_point() {
            Ok(point) => {
                self.trace.push(point);
                ErrorPointReport::Point(point)
            }
            Err(e) => {
                error!(error = %e, "error point read failed");
                ErrorPointReport::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn read_error_point(&mut self) -> Result<ErrorPoint, D::Error> {
        let time = self.started.elapsed().as_secs_f64();
        let source = self.mode.source();
        let error = match source.digital_channel() {
            Some(id) => {
                let measured = self
                    .driver
                    .read_input_voltage(id.default_input())
                    .map_err(Error::Hardware)?;
                let mut channel = self.channel(id);
                let target: f64 = if channel.read(PidRegister::UseSetpointSequence)? {
                    channel.read(PidRegister::SetpointInSequence)?
                } else {
                    channel.read(PidRegister::Setpoint)?
                };
                measured - target
            }
            None => {
                let measured = self
                    .driver
                    .read_input_voltage(AnalogInput::In1)
                    .map_err(Error::Hardware)?;
                let reference = self
                    .driver
                    .read_input_voltage(AnalogInput::In2)
                    .map_err(Error::Hardware)?;
                measured - reference
            }
        };
        let ival = self.active().read(PidRegister::Ival)?;
        Ok(ErrorPoint { time, error, ival })
    }

    pub fn set_use_setpoint_sequence(&mut self, enable: bool) -> Result<bool, D::Error> {
        self.sequencer("set_use_setpoint_sequence")?
            .set_use_setpoint_sequence(enable)
    }

    /// Load the active channel's setpoint table, volts.
    pub fn set_setpoint_array(&mut self, volts: &[f64]) -> Result<SetpointTable, D::Error> {
        self.sequencer("set_setpoint_array")?.set_setpoint_array(volts)
    }

    pub fn reset_sequence_index(&mut self) -> Result<SequencePosition, D::Error> {
        self.sequencer("reset_sequence_index")?.reset_sequence_index()
    }

    pub fn manually_change_setpoint(&mut self) -> Result<SequencePosition, D::Error> {
        self.sequencer("manually_change_setpoint")?
            .manually_change_setpoint()
    }

    /// Jump to a table entry. Only the low 4 bits of `index` are used.
    pub fn set_setpoint_index(&mut self, index: i64) -> Result<u8, D::Error> {
        self.sequencer("set_setpoint_index")?.set_setpoint_index(index)
    }

    /// Capture the mode flags and both channels as a config record.
    pub fn config_record(&mut self) -> Result<ConfigRecord, D::Error> {
        Ok(ConfigRecord {
            flags: self.mode.flags(),
            in1: self.channel(ChannelId::In1).read_config()?,
            in2: self.channel(ChannelId::In2).read_config()?,
        })
    }

    /// Save the current configuration to `store`, replacing whatever it held.
    pub fn write_to_config(&mut self, store: &mut impl ConfigStore) -> Result<ConfigRecord, D::Error> {
        let record = self.config_record()?;
        store.save(&record)?;
        Ok(record)
    }

    /// End of a buffered run. Returns both setpoints, volts.
    pub fn transition_to_manual(&mut self) -> Result<ChannelPair<f64>, D::Error> {
        let setpoints = ChannelPair {
            in1: self.channel(ChannelId::In1).get_setpoint()?,
            in2: self.channel(ChannelId::In2).get_setpoint()?,
        };
        info!(in1 = setpoints.in1, in2 = setpoints.in2, "transition to manual");
        Ok(setpoints)
    }

    /// Start of a buffered run. Loads the setpoint tables carried by the shot and rewinds those sequencers.
    ///
    /// Channels the shot says nothing about are left as they are.
    pub fn transition_to_buffered(&mut self, shot: &ShotParameters) -> Result<(), D::Error> {
        const OP: &str = "transition_to_buffered";
        for id in BOTH {
            let Some(table) = shot.setpoint_array(id) else {
                continue;
            };
            let mut channel = self.channel(id);
            channel
                .set_setpoint_array(table.as_array())
                .map_err(|e| e.incomplete(OP, "digital_setpoint_array"))?;
            channel
                .reset_sequence_index()
                .map_err(|e| e.incomplete(OP, "reset_sequence_index"))?;
            info!(channel = %id, "setpoint table loaded for shot");
        }
        Ok(())
    }

    pub fn abort_buffered(&mut self) -> Result<(), D::Error> {
        self.safe_state_all()?;
        info!("buffered run aborted, channels paused");
        Ok(())
    }

    pub fn abort_transition_to_buffered(&mut self) -> Result<(), D::Error> {
        self.safe_state_all()?;
        info!("transition to buffered aborted, channels paused");
        Ok(())
    }

    /// Leave both channels in the safe state. Errors are logged, not returned.
    pub fn shutdown(&mut self) {
        match self.safe_state_all() {
            Ok(()) => info!("shutdown, channels paused"),
            Err(e) => error!(error = %e, "shutdown could not pause every channel"),
        }
    }

    /// Park both channels. A failure on one channel does not stop the other, the first error is returned.
    fn safe_state_all(&mut self) -> Result<(), D::Error> {
        let mut first_error = None;
        for id in BOTH {
            if let Err(e) = self.channel(id).enter_safe_state() {
                error!(channel = %id, error = %e, "channel not parked");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
