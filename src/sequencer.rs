//! The 16 slot setpoint sequencer.
//!
//! Each digital channel carries a table of 16 setpoints, a current index and a wrap flag. With
//! `use_setpoint_sequence` set, the PID regulates against the table entry at the current index instead of the
//! scalar setpoint. The index advances on demand or on an external trigger, and the hardware raises the wrap
//! flag when it goes from 15 back to 0.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    calibration::Calibration,
    channel::PidChannel,
    driver::{PidDriver, SEQUENCE_LENGTH},
    error::{Error, Result},
    parse::ensure_finite,
    register::PidRegister,
};

/// A full setpoint table, volts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct SetpointTable([f64; SEQUENCE_LENGTH]);

impl SetpointTable {
    /// Build a table from up to 16 values. Shorter input is padded with zeros, longer input is truncated.
    pub fn from_slice(values: &[f64]) -> Self {
        if values.len() > SEQUENCE_LENGTH {
            warn!(
                len = values.len(),
                "setpoint array has more than {SEQUENCE_LENGTH} elements, only the first {SEQUENCE_LENGTH} are used"
            );
        } else if values.len() < SEQUENCE_LENGTH {
            debug!(len = values.len(), "setpoint array padded with zeros");
        }
        let mut table = [0.0; SEQUENCE_LENGTH];
        for (slot, value) in table.iter_mut().zip(values) {
            *slot = *value;
        }
        Self(table)
    }

    pub fn as_array(&self) -> &[f64; SEQUENCE_LENGTH] {
        &self.0
    }

    /// The table in digital units, as loaded into the hardware.
    pub fn to_digital(&self, calibration: Calibration) -> [f64; SEQUENCE_LENGTH] {
        self.0.map(|v| calibration.to_digital(v))
    }
}

impl From<Vec<f64>> for SetpointTable {
    fn from(values: Vec<f64>) -> Self {
        Self::from_slice(&values)
    }
}

impl From<SetpointTable> for Vec<f64> {
    fn from(table: SetpointTable) -> Self {
        table.0.to_vec()
    }
}

/// Keep the low 4 bits of an index, so out of range input wraps instead of failing.
pub const fn mask_index(index: i64) -> u8 {
    (index & 0x0F) as u8
}

/// Where the sequencer stands, as read back from the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SequencePosition {
    pub setpoint_index: u8,
    /// Volts.
    pub setpoint_in_sequence: f64,
    pub sequence_wrap_flag: bool,
}

impl<D: PidDriver> PidChannel<'_, D> {
    /// Switch the PID between the scalar setpoint and the setpoint table.
    pub fn set_use_setpoint_sequence(&mut self, enable: bool) -> Result<bool, D::Error> {
        self.write(PidRegister::UseSetpointSequence, enable)?;
        self.read(PidRegister::UseSetpointSequence)
    }

    /// Load the setpoint table from values in volts.
    ///
    /// Returns the full 16 entry table as stored. The host side copy is only updated once the hardware has
    /// accepted the table.
    pub fn set_setpoint_array(&mut self, volts: &[f64]) -> Result<SetpointTable, D::Error> {
        for &value in volts.iter().take(SEQUENCE_LENGTH) {
            ensure_finite(value)?;
        }
        let table = SetpointTable::from_slice(volts);
        let digital = table.to_digital(self.calibration());
        debug!(channel = %self.id, ?digital, "loading setpoint table");
        self.driver
            .set_setpoint_array(self.id, &digital)
            .map_err(Error::Hardware)?;
        self.state.setpoint_table = table;
        Ok(table)
    }

    /// Return to index 0 and clear the wrap flag.
    pub fn reset_sequence_index(&mut self) -> Result<SequencePosition, D::Error> {
        self.driver
            .reset_sequence_index(self.id)
            .map_err(Error::Hardware)?;
        self.read_sequence_position()
    }

    /// Advance to the next table entry. Wrapping from 15 to 0 raises the wrap flag.
    pub fn manually_change_setpoint(&mut self) -> Result<SequencePosition, D::Error> {
        self.driver
            .manually_change_setpoint(self.id)
            .map_err(Error::Hardware)?;
        let position = self.read_sequence_position()?;
        if position.setpoint_index == 0 {
            debug!(channel = %self.id, wrapped = position.sequence_wrap_flag, "sequence wrapped");
        }
        Ok(position)
    }

    /// Jump to a table entry. Only the low 4 bits of `index` are used.
    ///
    /// This never touches the wrap flag, even when jumping to 0.
    pub fn set_setpoint_index(&mut self, index: i64) -> Result<u8, D::Error> {
        let masked = mask_index(index);
        if masked as i64 != index {
            debug!(channel = %self.id, index, masked, "setpoint index masked");
        }
        self.write(PidRegister::SetpointIndex, masked)?;
        self.read(PidRegister::SetpointIndex)
    }

    /// Read the index, current table entry and wrap flag.
    pub fn read_sequence_position(&mut self) -> Result<SequencePosition, D::Error> {
        let setpoint_index = self.read(PidRegister::SetpointIndex)?;
        let digital: f64 = self.read(PidRegister::SetpointInSequence)?;
        let sequence_wrap_flag = self.read(PidRegister::SequenceWrapFlag)?;
        Ok(SequencePosition {
            setpoint_index,
            setpoint_in_sequence: self.calibration().to_physical(digital),
            sequence_wrap_flag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::ChannelState,
        mock_driver::{MockError, MockPid},
        register::ChannelId,
    };

    #[test]
    fn table_always_has_16_entries() {
        for len in 0..=20 {
            let values: Vec<f64> = (0..len).map(|i| i as f64 * 0.01 + 0.01).collect();
            let table = SetpointTable::from_slice(&values);
            assert_eq!(table.as_array().len(), SEQUENCE_LENGTH);
            for (i, entry) in table.as_array().iter().enumerate() {
                if i < len {
                    assert_eq!(*entry, values[i]);
                } else {
                    assert_eq!(*entry, 0.0);
                }
            }
        }
    }

    #[test]
    fn table_serializes_as_list() {
        let table = SetpointTable::from_slice(&[0.5, -0.25]);
        let json = serde_json::to_value(table).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 16);
        let back: SetpointTable = serde_json::from_str("[0.5, -0.25]").unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn index_masking() {
        assert_eq!(mask_index(20), 4);
        assert_eq!(mask_index(15), 15);
        assert_eq!(mask_index(16), 0);
        assert_eq!(mask_index(-1), 15);
    }

    #[test]
    fn set_array_writes_calibrated_table() {
        let mut mock = MockPid::new();
        let mut state = ChannelState::default();
        let mut channel = PidChannel::new(&mut mock, ChannelId::In1, &mut state);

        let table = channel.set_setpoint_array(&[0.25, 0.5]).unwrap();
        assert_eq!(table.as_array()[1], 0.5);
        assert_eq!(table.as_array()[2], 0.0);

        let cal = ChannelId::In1.calibration();
        let block = mock.block(ChannelId::In1);
        assert_eq!(block.setpoint_array[0], cal.to_digital(0.25));
        assert!((block.setpoint_array[1] - cal.half).abs() < 1e-12);
        assert_eq!(block.setpoint_array[15], cal.zero);
        assert_eq!(state.setpoint_table, table);
    }

    #[test]
    fn set_array_truncates_long_input() {
        let mut mock = MockPid::new();
        let mut state = ChannelState::default();
        let mut channel = PidChannel::new(&mut mock, ChannelId::In2, &mut state);
        let values = [0.1; 20];
        let table = channel.set_setpoint_array(&values).unwrap();
        assert_eq!(table.as_array(), &[0.1; 16]);
    }

    #[test]
    fn failed_array_keeps_host_copy() {
        let mut mock = MockPid::new();
        mock.set_sequence_error(true);
        let mut state = ChannelState::default();
        let mut channel = PidChannel::new(&mut mock, ChannelId::In1, &mut state);
        assert!(matches!(
            channel.set_setpoint_array(&[0.3]),
            Err(Error::Hardware(MockError::Sequence))
        ));
        assert_eq!(state.setpoint_table, SetpointTable::default());
    }

    #[test]
    fn sixteen_steps_wrap() {
        let mut mock = MockPid::new();
        let mut state = ChannelState::default();
        let mut channel = PidChannel::new(&mut mock, ChannelId::In1, &mut state);
        channel.reset_sequence_index().unwrap();

        for step in 1..=15 {
            let position = channel.manually_change_setpoint().unwrap();
            assert_eq!(position.setpoint_index, step);
            assert!(!position.sequence_wrap_flag);
        }
        let position = channel.manually_change_setpoint().unwrap();
        assert_eq!(position.setpoint_index, 0);
        assert!(position.sequence_wrap_flag);

        let position = channel.reset_sequence_index().unwrap();
        assert_eq!(position.setpoint_index, 0);
        assert!(!position.sequence_wrap_flag);
    }

    #[test]
    fn set_index_masks_and_ignores_wrap_flag() {
        let mut mock = MockPid::new();
        let mut state = ChannelState::default();
        let mut channel = PidChannel::new(&mut mock, ChannelId::In2, &mut state);

        assert_eq!(channel.set_setpoint_index(20).unwrap(), 4);

        for _ in 0..12 {
            channel.manually_change_setpoint().unwrap();
        }
        assert!(channel.read_sequence_position().unwrap().sequence_wrap_flag);
        // Jumping straight to 0 leaves the flag as it was.
        assert_eq!(channel.set_setpoint_index(0).unwrap(), 0);
        assert!(channel.read_sequence_position().unwrap().sequence_wrap_flag);

        channel.reset_sequence_index().unwrap();
        assert_eq!(channel.set_setpoint_index(0).unwrap(), 0);
        assert!(!channel.read_sequence_position().unwrap().sequence_wrap_flag);
    }

    #[test]
    fn position_reports_volts() {
        let mut mock = MockPid::new();
        let mut state = ChannelState::default();
        let mut channel = PidChannel::new(&mut mock, ChannelId::In1, &mut state);
        channel.set_setpoint_array(&[0.0, 0.0, 0.5]).unwrap();
        channel.set_setpoint_index(2).unwrap();
        let position = channel.read_sequence_position().unwrap();
        assert!((position.setpoint_in_sequence - 0.5).abs() < 1e-9);
        assert!(channel.set_use_setpoint_sequence(true).unwrap());
    }
}
