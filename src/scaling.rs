//! Conversion of raw ADC samples into engineering units.
//!
//! The analog front end is calibrated per channel with a linear `gain * raw + offset` curve.
//! Results saturate into `u16` since that is what goes onto the wire.

/// Volts per ADC count of the high-voltage dividers.
pub const DEFAULT_VOLTAGE_GAIN: f32 = 3.221407;

/// Tenths of a microamp per ADC count of the current shunts.
pub const DEFAULT_CURRENT_GAIN: f32 = 9.765625;

/// Milliamps per ADC count of the filament current sensor.
pub const DEFAULT_FILAMENT_GAIN: f32 = 4.8828125;

/// ADC reading of the bipolar filament sensor at zero current.
pub const FILAMENT_MIDPOINT: u16 = 512;

/// A linear calibration curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub gain: f32,
    pub offset: f32,
}

impl Calibration {
    pub const fn new(gain: f32, offset: f32) -> Self {
        Self { gain, offset }
    }

    /// Convert a raw sample, saturating to `0..=u16::MAX`.
    #[inline]
    pub fn apply(&self, raw: u16) -> u16 {
        // `as` from f32 saturates and maps NaN to zero.
        (f32::from(raw) * self.gain + self.offset) as u16
    }
}

/// Calibration of one supply channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    /// Raw counts to volts.
    pub voltage: Calibration,
    /// Raw counts to tenths of a microamp.
    pub current: Calibration,
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self {
            voltage: Calibration::new(DEFAULT_VOLTAGE_GAIN, 0.0),
            current: Calibration::new(DEFAULT_CURRENT_GAIN, 0.0),
        }
    }
}

/// Calibration of the filament current sensor.
///
/// The sensor is bipolar around [`FILAMENT_MIDPOINT`], only the magnitude is reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilamentCalibration {
    pub midpoint: u16,
    pub milliamps: Calibration,
}

impl Default for FilamentCalibration {
    fn default() -> Self {
        Self {
            midpoint: FILAMENT_MIDPOINT,
            milliamps: Calibration::new(DEFAULT_FILAMENT_GAIN, 0.0),
        }
    }
}

impl FilamentCalibration {
    /// Raw sample to milliamps.
    #[inline]
    pub fn apply(&self, raw: u16) -> u16 {
        self.milliamps.apply(raw.abs_diff(self.midpoint))
    }
}
