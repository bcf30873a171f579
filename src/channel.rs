//! This module contains the model of the four supply channels and the filament source.

use strum::EnumCount;
use strum_macros::{EnumCount as EnumCountMacro, EnumIter};

/// The four high-voltage supply channels.
///
/// On the wire channels are numbered `1` to `4` in declaration order.
#[derive(Debug, EnumIter, EnumCountMacro, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    /// Channel 1.
    Cathode = 0,
    /// Channel 2.
    Wehnelt = 1,
    /// Channel 3.
    Focus = 2,
    /// Channel 4. Not coupled to ramp cancellation, see [`Channel::cancels_ramp`].
    Aux = 3,
}

/// Number of supply channels.
pub const CHANNEL_COUNT: usize = Channel::COUNT;

impl Channel {
    /// All channels in protocol order.
    pub const ALL: [Channel; CHANNEL_COUNT] =
        [Channel::Cathode, Channel::Wehnelt, Channel::Focus, Channel::Aux];

    /// Array index of this channel (`0..4`).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Protocol number of this channel (`1..=4`).
    pub const fn number(self) -> u8 {
        self as u8 + 1
    }

    /// Look a channel up by its protocol number.
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Channel::Cathode),
            2 => Some(Channel::Wehnelt),
            3 => Some(Channel::Focus),
            4 => Some(Channel::Aux),
            _ => None,
        }
    }

    /// Look a channel up by its array index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Channel::Cathode),
            1 => Some(Channel::Wehnelt),
            2 => Some(Channel::Focus),
            3 => Some(Channel::Aux),
            _ => None,
        }
    }

    /// Whether switching this channel off, changing its polarity or writing one of its setpoints
    /// directly aborts an active ramp.
    ///
    /// The aux channel has never been coupled to the ramp. This looks accidental but the deployed
    /// behaviour is kept until it is confirmed either way.
    pub const fn cancels_ramp(self) -> bool {
        !matches!(self, Channel::Aux)
    }
}

/// Output polarity of a supply channel.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

/// Represents the two possible regulation modes of a supply channel.
///
/// Derived from a hardware status line and refreshed once per loop iteration.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitingMode {
    /// Constant voltage regulation.
    #[default]
    VoltageRegulating,
    /// Constant current regulation, the current limit is the active boundary.
    CurrentLimiting,
}

impl LimitingMode {
    /// Character used by the `psumode` reply for an energized channel.
    pub const fn status_char(self) -> u8 {
        match self {
            LimitingMode::VoltageRegulating => b'V',
            LimitingMode::CurrentLimiting => b'C',
        }
    }
}

impl From<bool> for LimitingMode {
    /// `true` means the hardware status line reports current limiting.
    fn from(current_limiting: bool) -> Self {
        match current_limiting {
            true => LimitingMode::CurrentLimiting,
            false => LimitingMode::VoltageRegulating,
        }
    }
}

/// State of one supply channel.
///
/// `measured_*` and `limiting_mode` are only written from the sampler, the setpoints and
/// `enabled`/`polarity` only by the command dispatcher and the ramp controller. The interlock
/// only ever clears `enabled`.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    /// Output energized.
    pub enabled: bool,
    pub polarity: Polarity,
    /// Voltage setpoint in device units (volts).
    pub voltage_setpoint: u16,
    /// Current limit in device units (microamps).
    pub current_limit_setpoint: u16,
    /// Raw voltage sample.
    pub measured_voltage: u16,
    /// Raw current sample.
    pub measured_current: u16,
    pub limiting_mode: LimitingMode,
}

impl ChannelState {
    /// The state a channel powers up in.
    ///
    /// The first three channels idle at negative polarity, the aux channel at positive.
    pub fn power_on(channel: Channel) -> Self {
        let polarity = match channel {
            Channel::Aux => Polarity::Positive,
            _ => Polarity::Negative,
        };
        Self {
            polarity,
            ..Default::default()
        }
    }

    /// Power-on state of every channel, indexed by [`Channel::index`].
    pub fn power_on_all() -> [Self; CHANNEL_COUNT] {
        Channel::ALL.map(Self::power_on)
    }

    /// Character used by the `psumode` reply: `-` disabled, `C` current limiting, `V` voltage
    /// regulating.
    pub fn status_char(&self) -> u8 {
        if self.enabled {
            self.limiting_mode.status_char()
        } else {
            b'-'
        }
    }
}

/// State of the filament current source.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilamentState {
    pub enabled: bool,
    /// Last current requested with `setfila`. A beam-on ramp ramps towards this value.
    pub requested_current: u16,
    /// Current currently driven into the output stage. Equals `requested_current` unless a ramp
    /// is in progress.
    pub output_current: u16,
    /// Raw filament current sample.
    pub measured_current: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn channel_number_conversions() {
        // Converting between protocol number and Channel should be the same in both directions.
        for channel in Channel::iter() {
            assert_eq!(Channel::from_number(channel.number()), Some(channel));
            assert_eq!(Channel::from_index(channel.index()), Some(channel));
        }
        assert_eq!(Channel::from_number(0), None);
        assert_eq!(Channel::from_number(5), None);
        assert_eq!(CHANNEL_COUNT, 4);
    }

    #[test]
    fn only_aux_is_decoupled_from_ramp() {
        let coupled: usize = Channel::iter().filter(|c| c.cancels_ramp()).count();
        assert_eq!(coupled, 3);
        assert!(!Channel::Aux.cancels_ramp());
    }

    #[test]
    fn status_chars() {
        let mut state = ChannelState::power_on(Channel::Cathode);
        assert_eq!(state.status_char(), b'-');

        state.enabled = true;
        assert_eq!(state.status_char(), b'V');

        state.limiting_mode = LimitingMode::from(true);
        assert_eq!(state.status_char(), b'C');
    }

    #[test]
    fn power_on_polarities() {
        assert_eq!(ChannelState::power_on(Channel::Focus).polarity, Polarity::Negative);
        assert_eq!(ChannelState::power_on(Channel::Aux).polarity, Polarity::Positive);

        let all = ChannelState::power_on_all();
        for channel in Channel::iter() {
            assert_eq!(all[channel.index()], ChannelState::power_on(channel));
        }
    }
}
