//! The channel controller: typed, unit-converting access to one hardware PID block.
//!
//! Every setter follows the same pattern. Validate the value, convert it to the register domain, write it,
//! read the register back and return the read-back converted to the caller's domain. The driver may clamp
//! what we write, so the read-back is what the caller gets to see.

use serde::Serialize;
use tracing::debug;

use crate::{
    calibration::{Calibration, limit_to_physical, limit_to_register},
    driver::PidDriver,
    error::{Error, Result, ValidationError},
    parse::ensure_finite,
    register::{AnalogInput, ChannelId, OutputDirect, PauseGains, PidRegister, RegisterValue},
    sequencer::SetpointTable,
    status::ChannelStatus,
};

/// Integrator value used to park a channel in its safe state.
pub const SAFE_IVAL: f64 = -0.99;

/// Host side state of one channel. Everything else lives in the hardware.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    /// Physical copy of the last setpoint table written to the hardware.
    pub(crate) setpoint_table: SetpointTable,
    /// Last full read of the hardware, refreshed after every mode transition.
    pub(crate) last_status: Option<ChannelStatus>,
}

impl ChannelState {
    pub fn setpoint_table(&self) -> &SetpointTable {
        &self.setpoint_table
    }

    pub fn last_status(&self) -> Option<&ChannelStatus> {
        self.last_status.as_ref()
    }
}

/// Values read back after [`PidChannel::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResetReadback {
    pub p: f64,
    pub i: f64,
    pub ival: f64,
    /// Volts.
    pub setpoint: f64,
}

/// A borrowed view of one PID block and its host side state.
pub struct PidChannel<'a, D: PidDriver> {
    pub(crate) driver: &'a mut D,
    pub(crate) id: ChannelId,
    pub(crate) state: &'a mut ChannelState,
}

impl<'a, D: PidDriver> PidChannel<'a, D> {
    pub fn new(driver: &'a mut D, id: ChannelId, state: &'a mut ChannelState) -> Self {
        Self { driver, id, state }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn calibration(&self) -> Calibration {
        self.id.calibration()
    }

    /// Read a register and decode it to the expected type.
    pub(crate) fn read<T: TryFrom<RegisterValue>>(
        &mut self,
        register: PidRegister,
    ) -> Result<T, D::Error> {
        let value = self
            .driver
            .read_register(self.id, register)
            .map_err(Error::Hardware)?;
        T::try_from(value).map_err(|_| Error::InvalidResponse)
    }

    /// Write a register without reading it back.
    pub(crate) fn write(
        &mut self,
        register: PidRegister,
        value: impl Into<RegisterValue>,
    ) -> Result<(), D::Error> {
        let value = value.into();
        debug!(channel = %self.id, %register, ?value, "register write");
        self.driver
            .write_register(self.id, register, value)
            .map_err(Error::Hardware)
    }

    /// Write a register then return what the hardware holds afterwards.
    fn write_read<T: TryFrom<RegisterValue>>(
        &mut self,
        register: PidRegister,
        value: impl Into<RegisterValue>,
    ) -> Result<T, D::Error> {
        self.write(register, value)?;
        self.read(register)
    }

    /// Set the proportional gain.
    pub fn set_p(&mut self, value: f64) -> Result<f64, D::Error> {
        let value = ensure_finite(value)?;
        self.write_read(PidRegister::P, value)
    }

    pub fn get_p(&mut self) -> Result<f64, D::Error> {
        self.read(PidRegister::P)
    }

    /// Set the integral gain.
    pub fn set_i(&mut self, value: f64) -> Result<f64, D::Error> {
        let value = ensure_finite(value)?;
        self.write_read(PidRegister::I, value)
    }

    pub fn get_i(&mut self) -> Result<f64, D::Error> {
        self.read(PidRegister::I)
    }

    /// Set the integrator accumulator, digital units.
    pub fn set_ival(&mut self, value: f64) -> Result<f64, D::Error> {
        let value = ensure_finite(value)?;
        self.write_read(PidRegister::Ival, value)
    }

    pub fn get_ival(&mut self) -> Result<f64, D::Error> {
        self.read(PidRegister::Ival)
    }

    /// Set the scalar setpoint. Value supplied and returned in volts.
    pub fn set_setpoint(&mut self, volts: f64) -> Result<f64, D::Error> {
        let volts = ensure_finite(volts)?;
        let cal = self.calibration();
        let digital: f64 = self.write_read(PidRegister::Setpoint, cal.to_digital(volts))?;
        Ok(cal.to_physical(digital))
    }

    /// Get the scalar setpoint in volts.
    pub fn get_setpoint(&mut self) -> Result<f64, D::Error> {
        let digital: f64 = self.read(PidRegister::Setpoint)?;
        Ok(self.calibration().to_physical(digital))
    }

    /// Get the lower output limit in absolute volts.
    pub fn get_min_voltage(&mut self) -> Result<f64, D::Error> {
        let raw: f64 = self.read(PidRegister::MinVoltage)?;
        Ok(limit_to_physical(raw))
    }

    /// Get the upper output limit in absolute volts.
    pub fn get_max_voltage(&mut self) -> Result<f64, D::Error> {
        let raw: f64 = self.read(PidRegister::MaxVoltage)?;
        Ok(limit_to_physical(raw))
    }

    /// Set the lower output limit in absolute volts.
    ///
    /// Rejected without touching the hardware unless it is below the current upper limit.
    pub fn set_min_voltage(&mut self, volts: f64) -> Result<f64, D::Error> {
        let volts = ensure_finite(volts)?;
        let max = self.get_max_voltage()?;
        if volts >= max {
            return Err(ValidationError::LimitsOutOfOrder { min: volts, max }.into());
        }
        let raw: f64 = self.write_read(PidRegister::MinVoltage, limit_to_register(volts))?;
        Ok(limit_to_physical(raw))
    }

    /// Set the upper output limit in absolute volts.
    ///
    /// Rejected without touching the hardware unless it is above the current lower limit.
    pub fn set_max_voltage(&mut self, volts: f64) -> Result<f64, D::Error> {
        let volts = ensure_finite(volts)?;
        let min = self.get_min_voltage()?;
        if min >= volts {
            return Err(ValidationError::LimitsOutOfOrder { min, max: volts }.into());
        }
        let raw: f64 = self.write_read(PidRegister::MaxVoltage, limit_to_register(volts))?;
        Ok(limit_to_physical(raw))
    }

    /// Set both output limits in absolute volts, returning `(min, max)` as read back.
    ///
    /// The writes are ordered so the hardware never holds an inverted pair. The second limit is checked against
    /// the first as read back, so if the driver clamped the first one the second can still be rejected. That is
    /// reported as [`Error::Incomplete`], the first limit stays written.
    pub fn set_voltage_limits(&mut self, min: f64, max: f64) -> Result<(f64, f64), D::Error> {
        const OP: &str = "set_voltage_limits";
        let min = ensure_finite(min)?;
        let max = ensure_finite(max)?;
        if min >= max {
            return Err(ValidationError::LimitsOutOfOrder { min, max }.into());
        }
        if min < self.get_max_voltage()? {
            let min = self.set_min_voltage(min)?;
            let max = self
                .set_max_voltage(max)
                .map_err(|e| e.incomplete(OP, "max_voltage"))?;
            Ok((min, max))
        } else {
            let max = self.set_max_voltage(max)?;
            let min = self
                .set_min_voltage(min)
                .map_err(|e| e.incomplete(OP, "min_voltage"))?;
            Ok((min, max))
        }
    }

    pub fn set_input(&mut self, input: AnalogInput) -> Result<AnalogInput, D::Error> {
        self.write_read(PidRegister::Input, input)
    }

    pub fn set_output_direct(&mut self, output: OutputDirect) -> Result<OutputDirect, D::Error> {
        self.write_read(PidRegister::OutputDirect, output)
    }

    pub fn set_pause_gains(&mut self, gains: PauseGains) -> Result<PauseGains, D::Error> {
        self.write_read(PidRegister::PauseGains, gains)
    }

    /// Pause or resume active correction. Returns the paused state read back.
    pub fn set_paused(&mut self, paused: bool) -> Result<bool, D::Error> {
        self.write_read(PidRegister::Paused, paused)
    }

    pub fn set_differential_mode(&mut self, enabled: bool) -> Result<bool, D::Error> {
        self.write_read(PidRegister::DifferentialModeEnabled, enabled)
    }

    /// Zero the gains, integrator, setpoint and setpoint table, in that order.
    ///
    /// Not transactional. A failure part way leaves the earlier steps applied.
    pub fn reset(&mut self) -> Result<ResetReadback, D::Error> {
        const OP: &str = "reset_pid";
        self.set_p(0.0).map_err(|e| e.incomplete(OP, "p"))?;
        self.set_i(0.0).map_err(|e| e.incomplete(OP, "i"))?;
        self.set_ival(0.0).map_err(|e| e.incomplete(OP, "ival"))?;
        self.set_setpoint(0.0)
            .map_err(|e| e.incomplete(OP, "setpoint"))?;
        self.set_setpoint_array(&[])
            .map_err(|e| e.incomplete(OP, "digital_setpoint_array"))?;
        Ok(ResetReadback {
            p: self.get_p()?,
            i: self.get_i()?,
            ival: self.get_ival()?,
            setpoint: self.get_setpoint()?,
        })
    }

    /// Hold both gain terms, pause, and park the integrator at [`SAFE_IVAL`].
    pub fn enter_safe_state(&mut self) -> Result<(), D::Error> {
        const OP: &str = "safe_state";
        self.set_pause_gains(PauseGains::Pi)
            .map_err(|e| e.incomplete(OP, "pause_gains"))?;
        self.set_paused(true)
            .map_err(|e| e.incomplete(OP, "paused"))?;
        self.set_ival(SAFE_IVAL)
            .map_err(|e| e.incomplete(OP, "ival"))?;
        Ok(())
    }
}
