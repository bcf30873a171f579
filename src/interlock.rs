//! The overcurrent interlock.
//!
//! A channel being driven by a ramp must never end up current limited: that means an insulation
//! breakdown or an arc. When it happens everything is switched off and the ramp is aborted. There
//! is no retry, the operator has to start the sequence again.

use strum::IntoEnumIterator;

use crate::channel::{CHANNEL_COUNT, Channel, ChannelState, FilamentState, LimitingMode};
use crate::hal::OutputStage;
use crate::protocol::FaultFlags;
use crate::ramp::RampController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvercurrentInterlock {
    enabled: bool,
}

impl Default for OvercurrentInterlock {
    fn default() -> Self {
        Self::new()
    }
}

impl OvercurrentInterlock {
    /// An armed interlock.
    pub const fn new() -> Self {
        Self { enabled: true }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disarm until the next restart.
    pub fn disable(&mut self) {
        warn!("Overcurrent protection disabled");
        self.enabled = false;
    }

    /// Check the current measurements against the ramp state.
    ///
    /// Trips if any channel energized by a ramp reports current limiting, whether the ramp is
    /// still running, completed or cancelled. On a trip all channels are de-energized, the
    /// filament is switched off and the ramp latches the trip, so a persisting fault is only
    /// reported once. Returns the channels to report as faulty.
    pub fn check<O: OutputStage>(
        &mut self,
        ramp: &mut RampController,
        channels: &mut [ChannelState; CHANNEL_COUNT],
        filament: &mut FilamentState,
        output: &mut O,
    ) -> Option<FaultFlags> {
        if !self.enabled {
            return None;
        }

        let limiting = |ch: Channel| channels[ch.index()].limiting_mode == LimitingMode::CurrentLimiting;
        if !Channel::iter().any(|ch| ramp.is_driving(ch) && limiting(ch)) {
            return None;
        }

        let mut flags = FaultFlags::new();
        for channel in Channel::iter().filter(|&ch| ramp.voltage_target(ch) != 0 && limiting(ch)) {
            flags.flag(channel);
        }

        error!("Overcurrent interlock tripped in {}", ramp.mode());
        for channel in Channel::iter() {
            let state = &mut channels[channel.index()];
            state.enabled = false;
            output.set_channel_output(channel, false, state.polarity);
        }
        filament.enabled = false;
        output.set_filament_enabled(false);
        ramp.trip();

        Some(flags)
    }
}
