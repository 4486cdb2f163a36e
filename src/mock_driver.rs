//! We use this mocking module in unit tests to emulate the instrument's two PID blocks.

use thiserror::Error;

use crate::{
    driver::{PidDriver, SEQUENCE_LENGTH},
    register::{AnalogInput, ChannelId, OutputDirect, PauseGains, PidRegister, RegisterValue},
};

/// Largest value the emulated fixed point registers can hold.
pub const REGISTER_MAX: f64 = 1.0 - 1.0 / 8192.0;
/// Smallest value the emulated fixed point registers can hold.
pub const REGISTER_MIN: f64 = -1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MockError {
    /// Simulated failure reading a register
    #[error("simulated read failure on {0}")]
    Read(PidRegister),
    /// Simulated failure writing a register
    #[error("simulated write failure on {0}")]
    Write(PidRegister),
    /// Simulated failure of the setpoint table methods
    #[error("simulated sequence failure")]
    Sequence,
    /// Simulated failure of the scope
    #[error("simulated scope failure")]
    Scope,
    #[error("{0} is read-only")]
    ReadOnly(PidRegister),
    #[error("wrong value type for {0}")]
    WrongType(PidRegister),
}

/// Register file of one emulated PID block.
#[derive(Debug, Clone, PartialEq)]
pub struct MockBlock {
    pub input: AnalogInput,
    pub output_direct: OutputDirect,
    pub setpoint: f64,
    pub p: f64,
    pub i: f64,
    pub ival: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub pause_gains: PauseGains,
    pub paused: bool,
    pub differential_mode_enabled: bool,
    pub use_setpoint_sequence: bool,
    pub setpoint_index: u8,
    pub setpoint_array: [f64; SEQUENCE_LENGTH],
    pub sequence_wrap_flag: bool,
}

impl MockBlock {
    fn new(channel: ChannelId) -> Self {
        Self {
            input: channel.default_input(),
            output_direct: OutputDirect::Off,
            setpoint: 0.0,
            p: 0.0,
            i: 0.0,
            ival: 0.0,
            min_voltage: REGISTER_MIN,
            max_voltage: REGISTER_MAX,
            pause_gains: PauseGains::Off,
            paused: false,
            differential_mode_enabled: false,
            use_setpoint_sequence: false,
            setpoint_index: 0,
            setpoint_array: [0.0; SEQUENCE_LENGTH],
            sequence_wrap_flag: false,
        }
    }
}

/// Our mock type used to emulate the instrument.
pub struct MockPid {
    blocks: [MockBlock; 2],
    /// Voltages returned by the scope for `in1` and `in2`
    scope: [f64; 2],
    /// Every accepted register write, in order
    writes: Vec<(ChannelId, PidRegister, RegisterValue)>,
    /// Register whose reads should fail
    fail_read: Option<(ChannelId, PidRegister)>,
    /// Register whose writes should fail
    fail_write: Option<(ChannelId, PidRegister)>,
    /// Flag to simulate failures of the setpoint table methods
    fail_sequence: bool,
    /// Flag to simulate scope failures
    fail_scope: bool,
}

fn clamp_register(value: f64) -> f64 {
    value.clamp(REGISTER_MIN, REGISTER_MAX)
}

impl MockPid {
    /// Create a new MockPid with both blocks at their power-on state
    pub fn new() -> Self {
        Self {
            blocks: [MockBlock::new(ChannelId::In1), MockBlock::new(ChannelId::In2)],
            scope: [0.0; 2],
            writes: Vec::new(),
            fail_read: None,
            fail_write: None,
            fail_sequence: false,
            fail_scope: false,
        }
    }

    /// Get a reference to the register file of one block
    pub fn block(&self, channel: ChannelId) -> &MockBlock {
        &self.blocks[channel.index()]
    }

    /// Get a mutable reference to the register file of one block, bypassing the write log
    pub fn block_mut(&mut self, channel: ChannelId) -> &mut MockBlock {
        &mut self.blocks[channel.index()]
    }

    /// Set the voltage the scope reports for an input
    pub fn set_scope(&mut self, input: AnalogInput, value: f64) {
        let index = match input {
            AnalogInput::In1 => 0,
            AnalogInput::In2 => 1,
        };
        self.scope[index] = value;
    }

    /// Get the register writes accepted so far
    pub fn writes(&self) -> &[(ChannelId, PidRegister, RegisterValue)] {
        &self.writes
    }

    /// Clear the write log
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Configure which register read should fail, if any
    pub fn set_read_error(&mut self, target: Option<(ChannelId, PidRegister)>) {
        self.fail_read = target;
    }

    /// Configure which register write should fail, if any
    pub fn set_write_error(&mut self, target: Option<(ChannelId, PidRegister)>) {
        self.fail_write = target;
    }

    /// Configure whether the setpoint table methods should fail
    pub fn set_sequence_error(&mut self, should_error: bool) {
        self.fail_sequence = should_error;
    }

    /// Configure whether scope reads should fail
    pub fn set_scope_error(&mut self, should_error: bool) {
        self.fail_scope = should_error;
    }
}

impl PidDriver for MockPid {
    type Error = MockError;

    fn read_register(
        &mut self,
        channel: ChannelId,
        register: PidRegister,
    ) -> Result<RegisterValue, Self::Error> {
        if self.fail_read == Some((channel, register)) {
            return Err(MockError::Read(register));
        }
        let block = &self.blocks[channel.index()];
        let value = match register {
            PidRegister::Input => block.input.into(),
            PidRegister::OutputDirect => block.output_direct.into(),
            PidRegister::Setpoint => block.setpoint.into(),
            PidRegister::P => block.p.into(),
            PidRegister::I => block.i.into(),
            PidRegister::Ival => block.ival.into(),
            PidRegister::MinVoltage => block.min_voltage.into(),
            PidRegister::MaxVoltage => block.max_voltage.into(),
            PidRegister::PauseGains => block.pause_gains.into(),
            PidRegister::Paused => block.paused.into(),
            PidRegister::DifferentialModeEnabled => block.differential_mode_enabled.into(),
            PidRegister::UseSetpointSequence => block.use_setpoint_sequence.into(),
            PidRegister::SetpointIndex => block.setpoint_index.into(),
            PidRegister::SetpointInSequence => {
                block.setpoint_array[block.setpoint_index as usize].into()
            }
            PidRegister::SequenceWrapFlag => block.sequence_wrap_flag.into(),
        };
        Ok(value)
    }

    fn write_register(
        &mut self,
        channel: ChannelId,
        register: PidRegister,
        value: RegisterValue,
    ) -> Result<(), Self::Error> {
        if self.fail_write == Some((channel, register)) {
            return Err(MockError::Write(register));
        }
        if !register.is_writable() {
            return Err(MockError::ReadOnly(register));
        }
        let block = &mut self.blocks[channel.index()];
        match (register, value) {
            (PidRegister::Input, RegisterValue::Input(v)) => block.input = v,
            (PidRegister::OutputDirect, RegisterValue::Output(v)) => block.output_direct = v,
            (PidRegister::Setpoint, RegisterValue::Float(v)) => block.setpoint = clamp_register(v),
            (PidRegister::P, RegisterValue::Float(v)) => block.p = v,
            (PidRegister::I, RegisterValue::Float(v)) => block.i = v,
            (PidRegister::Ival, RegisterValue::Float(v)) => block.ival = clamp_register(v),
            (PidRegister::MinVoltage, RegisterValue::Float(v)) => {
                block.min_voltage = clamp_register(v)
            }
            (PidRegister::MaxVoltage, RegisterValue::Float(v)) => {
                block.max_voltage = clamp_register(v)
            }
            (PidRegister::PauseGains, RegisterValue::PauseGains(v)) => block.pause_gains = v,
            (PidRegister::Paused, RegisterValue::Flag(v)) => block.paused = v,
            (PidRegister::DifferentialModeEnabled, RegisterValue::Flag(v)) => {
                block.differential_mode_enabled = v
            }
            (PidRegister::UseSetpointSequence, RegisterValue::Flag(v)) => {
                block.use_setpoint_sequence = v
            }
            // The hardware only decodes the low 4 bits.
            (PidRegister::SetpointIndex, RegisterValue::Index(v)) => block.setpoint_index = v & 0x0F,
            _ => return Err(MockError::WrongType(register)),
        }
        self.writes.push((channel, register, value));
        Ok(())
    }

    fn set_setpoint_array(
        &mut self,
        channel: ChannelId,
        values: &[f64; SEQUENCE_LENGTH],
    ) -> Result<(), Self::Error> {
        if self.fail_sequence {
            return Err(MockError::Sequence);
        }
        let block = &mut self.blocks[channel.index()];
        for (slot, &value) in block.setpoint_array.iter_mut().zip(values) {
            *slot = clamp_register(value);
        }
        Ok(())
    }

    fn reset_sequence_index(&mut self, channel: ChannelId) -> Result<(), Self::Error> {
        if self.fail_sequence {
            return Err(MockError::Sequence);
        }
        let block = &mut self.blocks[channel.index()];
        block.setpoint_index = 0;
        block.sequence_wrap_flag = false;
        Ok(())
    }

    fn manually_change_setpoint(&mut self, channel: ChannelId) -> Result<(), Self::Error> {
        if self.fail_sequence {
            return Err(MockError::Sequence);
        }
        let block = &mut self.blocks[channel.index()];
        block.setpoint_index = (block.setpoint_index + 1) % SEQUENCE_LENGTH as u8;
        if block.setpoint_index == 0 {
            block.sequence_wrap_flag = true;
        }
        Ok(())
    }

    fn read_input_voltage(&mut self, input: AnalogInput) -> Result<f64, Self::Error> {
        if self.fail_scope {
            return Err(MockError::Scope);
        }
        Ok(match input {
            AnalogInput::In1 => self.scope[0],
            AnalogInput::In2 => self.scope[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mock_pid() {
        let mock = MockPid::new();
        assert!(mock.writes().is_empty());
        assert_eq!(mock.block(ChannelId::In2).input, AnalogInput::In2);
        assert_eq!(mock.fail_read, None);
        assert!(!mock.fail_sequence);
    }

    #[test]
    fn test_write_then_read() {
        let mut mock = MockPid::new();
        mock.write_register(ChannelId::In1, PidRegister::P, 0.25.into())
            .unwrap();
        let value = mock.read_register(ChannelId::In1, PidRegister::P).unwrap();
        assert_eq!(value, RegisterValue::Float(0.25));
        // The other block is untouched.
        assert_eq!(mock.block(ChannelId::In2).p, 0.0);
        assert_eq!(mock.writes().len(), 1);
    }

    #[test]
    fn test_voltage_registers_clamp() {
        let mut mock = MockPid::new();
        mock.write_register(ChannelId::In1, PidRegister::Setpoint, 3.0.into())
            .unwrap();
        assert_eq!(mock.block(ChannelId::In1).setpoint, REGISTER_MAX);
        mock.write_register(ChannelId::In1, PidRegister::MinVoltage, (-7.0).into())
            .unwrap();
        assert_eq!(mock.block(ChannelId::In1).min_voltage, REGISTER_MIN);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut mock = MockPid::new();
        let result = mock.write_register(ChannelId::In1, PidRegister::Paused, 1.0.into());
        assert_eq!(result, Err(MockError::WrongType(PidRegister::Paused)));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_read_only_rejected() {
        let mut mock = MockPid::new();
        let result = mock.write_register(
            ChannelId::In1,
            PidRegister::SequenceWrapFlag,
            false.into(),
        );
        assert_eq!(result, Err(MockError::ReadOnly(PidRegister::SequenceWrapFlag)));
    }

    #[test]
    fn test_index_masked() {
        let mut mock = MockPid::new();
        mock.write_register(ChannelId::In2, PidRegister::SetpointIndex, 20u8.into())
            .unwrap();
        assert_eq!(mock.block(ChannelId::In2).setpoint_index, 4);
    }

    #[test]
    fn test_manual_step_wraps() {
        let mut mock = MockPid::new();
        for _ in 0..15 {
            mock.manually_change_setpoint(ChannelId::In1).unwrap();
        }
        assert_eq!(mock.block(ChannelId::In1).setpoint_index, 15);
        assert!(!mock.block(ChannelId::In1).sequence_wrap_flag);
        mock.manually_change_setpoint(ChannelId::In1).unwrap();
        assert_eq!(mock.block(ChannelId::In1).setpoint_index, 0);
        assert!(mock.block(ChannelId::In1).sequence_wrap_flag);
        mock.reset_sequence_index(ChannelId::In1).unwrap();
        assert!(!mock.block(ChannelId::In1).sequence_wrap_flag);
    }

    #[test]
    fn test_setpoint_in_sequence_follows_index() {
        let mut mock = MockPid::new();
        let mut table = [0.0; SEQUENCE_LENGTH];
        table[3] = 0.125;
        mock.set_setpoint_array(ChannelId::In1, &table).unwrap();
        mock.block_mut(ChannelId::In1).setpoint_index = 3;
        let value = mock
            .read_register(ChannelId::In1, PidRegister::SetpointInSequence)
            .unwrap();
        assert_eq!(value, RegisterValue::Float(0.125));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockPid::new();
        mock.set_read_error(Some((ChannelId::In2, PidRegister::Ival)));
        assert!(mock.read_register(ChannelId::In2, PidRegister::Ival).is_err());
        assert!(mock.read_register(ChannelId::In1, PidRegister::Ival).is_ok());

        mock.set_write_error(Some((ChannelId::In1, PidRegister::I)));
        assert_eq!(
            mock.write_register(ChannelId::In1, PidRegister::I, 1.0.into()),
            Err(MockError::Write(PidRegister::I))
        );

        mock.set_sequence_error(true);
        assert_eq!(
            mock.reset_sequence_index(ChannelId::In1),
            Err(MockError::Sequence)
        );

        mock.set_scope(AnalogInput::In2, 0.3);
        assert_eq!(mock.read_input_voltage(AnalogInput::In2), Ok(0.3));
        mock.set_scope_error(true);
        assert_eq!(mock.read_input_voltage(AnalogInput::In2), Err(MockError::Scope));
    }
}
