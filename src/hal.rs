//! Traits for the hardware the controller drives.
//!
//! The sampling ADCs, duty-cycle outputs and the tick timer all live outside of this crate. A
//! board support package implements these traits, tests implement them against a simulated plant.

use fugit::Instant;

use crate::channel::{Channel, LimitingMode, Polarity};

/// Monotonic microsecond timestamp. Wraps after roughly 71 minutes.
pub type Timestamp = Instant<u32, 1, 1_000_000>;

/// Access to the most recent samples of the analog front end.
///
/// All values are raw ADC counts. Implementations must return a consistent sample, e.g. by
/// masking the sampling interrupt while copying.
pub trait Sampler {
    fn read_channel_voltage(&mut self, channel: Channel) -> u16;

    fn read_channel_current(&mut self, channel: Channel) -> u16;

    /// State of the channel's constant-current status line.
    fn read_limiting_mode(&mut self, channel: Channel) -> LimitingMode;

    fn read_filament_current(&mut self) -> u16;
}

/// The duty-cycle outputs realizing setpoints.
///
/// Implementations may slew-limit internally. Every call is idempotent, the controller writes
/// the full output state once per loop iteration.
pub trait OutputStage {
    /// Switch a channel's high-voltage output and its polarity relays.
    fn set_channel_output(&mut self, channel: Channel, enabled: bool, polarity: Polarity);

    /// Voltage setpoint in volts.
    fn set_channel_voltage(&mut self, channel: Channel, volts: u16);

    /// Current limit in microamps.
    fn set_channel_current_limit(&mut self, channel: Channel, microamps: u16);

    fn set_filament_current(&mut self, value: u16);

    fn set_filament_enabled(&mut self, enabled: bool);
}

/// A free-running microsecond clock.
pub trait Monotonic {
    fn now(&mut self) -> Timestamp;
}

/// Everything the controller needs from the board.
pub trait Board: Sampler + OutputStage + Monotonic {
    /// Restart the device. On hardware this does not return.
    fn reset(&mut self);
}
