//! The ramp sequencer.
//!
//! Insulation tests and beam-on sequences bring the channels up in small voltage steps on a
//! fixed cadence. A beam-on sequence first ramps the filament current towards the last requested
//! filament setpoint, then ramps the voltages.
//!
//! [`RampController::tick`] is a step function: every call performs at most one action and then
//! returns, so timing fidelity is bounded by how often it is called.

use fugit::MicrosDurationU32;
use strum::IntoEnumIterator;

use crate::channel::{CHANNEL_COUNT, Channel, ChannelState, FilamentState};
use crate::config::Config;
use crate::hal::{OutputStage, Timestamp};

/// What the ramp sequencer is currently doing.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampMode {
    #[default]
    Idle,
    BeamOn,
    /// Reserved. No command enters this mode and [`RampController::tick`] treats it as idle.
    FilamentConditioning,
    InsulationTest,
}

/// Outcome of a [`RampController::tick`] that did something.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampEvent {
    /// Every channel moved one step towards its target.
    VoltagesStepped,
    /// The filament current moved one step towards its target.
    FilamentStepped,
    /// All channels reached their targets during an insulation test and were switched back off.
    InsulationTestPassed,
    /// All channels reached their targets during a beam-on sequence. The beam stays on.
    BeamOnReached,
}

/// Ramp state. Created idle, mutated only through the entry points below.
#[derive(Debug, Clone, Copy)]
pub struct RampController {
    mode: RampMode,
    voltage_targets: [u16; CHANNEL_COUNT],
    voltage_current: [u16; CHANNEL_COUNT],
    filament_target: u16,
    filament_current: u16,
    last_tick: Timestamp,
    /// Set by an interlock trip, cleared when the next ramp starts.
    tripped: bool,
}

impl Default for RampController {
    fn default() -> Self {
        Self::new()
    }
}

impl RampController {
    pub const fn new() -> Self {
        Self {
            mode: RampMode::Idle,
            voltage_targets: [0; CHANNEL_COUNT],
            voltage_current: [0; CHANNEL_COUNT],
            filament_target: 0,
            filament_current: 0,
            last_tick: Timestamp::from_ticks(0),
            tripped: false,
        }
    }

    pub fn mode(&self) -> RampMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        matches!(self.mode, RampMode::BeamOn | RampMode::InsulationTest)
    }

    pub fn voltage_target(&self, channel: Channel) -> u16 {
        self.voltage_targets[channel.index()]
    }

    /// Voltage the ramp has brought `channel` to so far.
    pub fn voltage_progress(&self, channel: Channel) -> u16 {
        self.voltage_current[channel.index()]
    }

    pub fn filament_target(&self) -> u16 {
        self.filament_target
    }

    pub fn filament_progress(&self) -> u16 {
        self.filament_current
    }

    /// Whether the last ramp ended in an interlock trip.
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Whether `channel` is energized by a ramp: it has a target and is past the initial delay.
    ///
    /// This stays true after the ramp completes or is cancelled, and only ends when the ramp
    /// trips or an insulation test switches the channels off.
    pub fn is_driving(&self, channel: Channel) -> bool {
        !self.tripped && self.voltage_target(channel) != 0 && self.voltage_progress(channel) != 0
    }

    /// Start an insulation test.
    ///
    /// All channels are zeroed with the insulation-test current limits and the filament is
    /// switched off. The voltages then ramp to the configured targets.
    pub fn start_insulation_test(
        &mut self,
        now: Timestamp,
        config: &Config,
        channels: &mut [ChannelState; CHANNEL_COUNT],
        filament: &mut FilamentState,
    ) {
        info!("Starting insulation test");
        Self::zero_channels(channels, &config.insulation_current_limits);
        filament.enabled = false;
        self.begin(RampMode::InsulationTest, now, config, 0);
    }

    /// Start a beam-on sequence.
    ///
    /// All channels are zeroed with the beam-on current limits, the filament is switched off and
    /// restarted from zero towards the last requested filament current. Once the filament is at
    /// its target the voltages ramp to the configured targets.
    pub fn start_beam_on(
        &mut self,
        now: Timestamp,
        config: &Config,
        channels: &mut [ChannelState; CHANNEL_COUNT],
        filament: &mut FilamentState,
    ) {
        info!("Starting beam on, filament target {=u16}", filament.requested_current);
        Self::zero_channels(channels, &config.beam_on_current_limits);
        filament.enabled = false;
        filament.output_current = 0;
        self.begin(RampMode::BeamOn, now, config, filament.requested_current);
    }

    /// Stop stepping. Progress is kept, the channels it energized are still guarded.
    pub fn cancel(&mut self) {
        if self.is_active() {
            debug!("Ramp cancelled in {}", self.mode);
        }
        self.mode = RampMode::Idle;
    }

    /// Stop after an interlock trip. Nothing counts as driven until the next ramp starts.
    pub fn trip(&mut self) {
        self.cancel();
        self.tripped = true;
    }

    /// Advance the active ramp by at most one action.
    ///
    /// Elapsed time is measured against the timestamp of the last action with wrapping
    /// arithmetic, so a wrapping clock is fine as long as ticks come more often than once per
    /// wrap period.
    pub fn tick<O: OutputStage>(
        &mut self,
        now: Timestamp,
        config: &Config,
        channels: &mut [ChannelState; CHANNEL_COUNT],
        filament: &mut FilamentState,
        output: &mut O,
    ) -> Option<RampEvent> {
        if !self.is_active() {
            return None;
        }
        let elapsed = MicrosDurationU32::from_ticks(now.ticks().wrapping_sub(self.last_tick.ticks()));

        if self.mode == RampMode::BeamOn && self.filament_current != self.filament_target {
            if elapsed < config.filament_step_duration {
                return None;
            }
            if self.filament_current == 0 {
                filament.enabled = true;
                output.set_filament_enabled(true);
                for channel in Channel::iter() {
                    let limit = config.beam_on_current_limits[channel.index()];
                    channels[channel.index()].current_limit_setpoint = limit;
                    output.set_channel_current_limit(channel, limit);
                }
            }
            self.filament_current =
                step_towards(self.filament_current, self.filament_target, config.filament_step);
            filament.output_current = self.filament_current;
            output.set_filament_current(self.filament_current);
            self.last_tick = now;
            return Some(RampEvent::FilamentStepped);
        }

        if self.voltage_current == self.voltage_targets {
            return Some(self.complete(channels, output));
        }

        let interval = if self.voltage_current.iter().all(|&v| v == 0) {
            config.initial_duration
        } else {
            config.voltage_step_duration
        };
        if elapsed < interval {
            return None;
        }

        for channel in Channel::iter() {
            let i = channel.index();
            self.voltage_current[i] =
                step_towards(self.voltage_current[i], self.voltage_targets[i], config.voltage_step);

            let state = &mut channels[i];
            state.voltage_setpoint = self.voltage_current[i];
            if self.voltage_current[i] != 0 {
                state.enabled = true;
            }
            output.set_channel_output(channel, state.enabled, state.polarity);
            output.set_channel_voltage(channel, state.voltage_setpoint);
        }
        self.last_tick = now;
        Some(RampEvent::VoltagesStepped)
    }

    fn begin(&mut self, mode: RampMode, now: Timestamp, config: &Config, filament_target: u16) {
        self.mode = mode;
        self.voltage_targets = config.ramp_targets;
        self.voltage_current = [0; CHANNEL_COUNT];
        self.filament_target = filament_target;
        self.filament_current = 0;
        self.last_tick = now;
        self.tripped = false;
    }

    fn zero_channels(channels: &mut [ChannelState; CHANNEL_COUNT], limits: &[u16; CHANNEL_COUNT]) {
        for (state, &limit) in channels.iter_mut().zip(limits) {
            state.voltage_setpoint = 0;
            state.current_limit_setpoint = limit;
        }
    }

    fn complete<O: OutputStage>(
        &mut self,
        channels: &mut [ChannelState; CHANNEL_COUNT],
        output: &mut O,
    ) -> RampEvent {
        let event = match self.mode {
            RampMode::InsulationTest => {
                for channel in Channel::iter() {
                    let state = &mut channels[channel.index()];
                    state.voltage_setpoint = 0;
                    state.enabled = false;
                    output.set_channel_voltage(channel, 0);
                    output.set_channel_output(channel, false, state.polarity);
                }
                // Nothing is driven any more.
                self.voltage_current = [0; CHANNEL_COUNT];
                RampEvent::InsulationTestPassed
            }
            _ => RampEvent::BeamOnReached,
        };
        info!("Ramp finished: {}", event);
        self.mode = RampMode::Idle;
        event
    }
}

/// Move `current` one step of at most `step` towards `target` without overshooting.
///
/// A zero step is treated as one so a ramp always terminates.
fn step_towards(current: u16, target: u16, step: u16) -> u16 {
    let step = step.max(1);
    if current < target {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    }
}
