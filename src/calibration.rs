//! Calibration between physical volts and the instrument's digital setpoint units.
//!
//! Each analog input has its own two-point linear calibration: the digital value read at 0 V and the digital
//! value read at 0.5 V. The output limits are not calibrated per channel, they are stored as a delta about the
//! middle of the output range, [`OUT_ZERO`].

use crate::register::ChannelId;

/// Upper end of the calibrated output range, volts.
pub const OUT_MAX: f64 = 2.031;
/// Lower end of the calibrated output range, volts.
pub const OUT_MIN: f64 = 0.007;
/// Physical voltage corresponding to a limit register value of `0.0`.
pub const OUT_ZERO: f64 = (OUT_MAX + OUT_MIN) / 2.0;

/// Physical voltage of the second calibration point.
const HALF_SCALE_VOLTS: f64 = 0.5;

/// Two-point linear calibration of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Digital value measured for 0 V.
    pub zero: f64,
    /// Digital value measured for 0.5 V.
    pub half: f64,
}

impl Calibration {
    /// Calibration of the `in1` input.
    pub const IN1: Self = Self::new(-0.011962890625, 0.42919921875);
    /// Calibration of the `in2` input.
    pub const IN2: Self = Self::new(-0.0052490234375, 0.43505859375);

    /// Create a calibration from its two measured points.
    ///
    /// `zero` and `half` must differ, otherwise the map has no inverse.
    pub const fn new(zero: f64, half: f64) -> Self {
        Self { zero, half }
    }

    /// Digital units per volt.
    #[inline]
    pub const fn slope(&self) -> f64 {
        (self.half - self.zero) / HALF_SCALE_VOLTS
    }

    /// Convert volts to digital setpoint units.
    #[inline]
    pub const fn to_digital(&self, physical: f64) -> f64 {
        self.slope() * physical + self.zero
    }

    /// Convert digital setpoint units to volts.
    #[inline]
    pub const fn to_physical(&self, digital: f64) -> f64 {
        (digital - self.zero) / self.slope()
    }
}

impl ChannelId {
    /// Get the calibration of this channel's input.
    ///
    /// `in1` and `in2` are calibrated independently and must not be swapped.
    pub const fn calibration(&self) -> Calibration {
        match self {
            ChannelId::In1 => Calibration::IN1,
            ChannelId::In2 => Calibration::IN2,
        }
    }
}

/// Convert an absolute output limit in volts to the limit register value.
#[inline]
pub const fn limit_to_register(physical: f64) -> f64 {
    physical - OUT_ZERO
}

/// Convert a limit register value to an absolute output limit in volts.
#[inline]
pub const fn limit_to_physical(register: f64) -> f64 {
    register + OUT_ZERO
}
