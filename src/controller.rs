//! The control loop and command dispatcher.
//!
//! [`Controller`] owns all channel, filament and ramp state together with the board. Each call to
//! [`Controller::poll`] is one loop iteration, in this order:
//! 1. handle at most one complete message per command port,
//! 2. refresh the measurements from the sampler,
//! 3. write all setpoints to the output stage,
//! 4. advance the ramp by one step,
//! 5. run the overcurrent interlock.
//!
//! The interlock therefore always sees this iteration's measurements and ramp state.

use strum::IntoEnumIterator;

use crate::channel::{CHANNEL_COUNT, Channel, ChannelState, FilamentState};
use crate::config::Config;
use crate::hal::Board;
use crate::interlock::OvercurrentInterlock;
use crate::protocol::{Command, Reply, poll_frame, write_frame};
use crate::ramp::{RampController, RampEvent};
use crate::transport::Transport;

/// Where the answer to a command goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The command has no reply.
    Silent,
    /// Answer on the port the command arrived on.
    Reply(Reply),
    /// Unsolicited status, sent on every port.
    Broadcast(Reply),
}

pub struct Controller<B: Board> {
    board: B,
    config: Config,
    channels: [ChannelState; CHANNEL_COUNT],
    filament: FilamentState,
    ramp: RampController,
    interlock: OvercurrentInterlock,
}

impl<B: Board> Controller<B> {
    /// Create a controller in its power-on state: all outputs off, no ramp, interlock armed.
    pub fn new(board: B, config: Config) -> Self {
        info!("Controller starting");
        Self {
            board,
            config,
            channels: ChannelState::power_on_all(),
            filament: FilamentState::default(),
            ramp: RampController::new(),
            interlock: OvercurrentInterlock::new(),
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channel(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    pub fn filament(&self) -> &FilamentState {
        &self.filament
    }

    pub fn ramp(&self) -> &RampController {
        &self.ramp
    }

    pub fn interlock(&self) -> &OvercurrentInterlock {
        &self.interlock
    }

    /// Last measured voltage of `channel` in volts.
    pub fn measured_volts(&self, channel: Channel) -> u16 {
        self.config
            .calibration(channel)
            .voltage
            .apply(self.channel(channel).measured_voltage)
    }

    /// Last measured current of `channel` in tenths of a microamp.
    pub fn measured_current(&self, channel: Channel) -> u16 {
        self.config
            .calibration(channel)
            .current
            .apply(self.channel(channel).measured_current)
    }

    /// Last measured filament current in milliamps.
    pub fn filament_milliamps(&self) -> u16 {
        self.config
            .filament_calibration
            .apply(self.filament.measured_current)
    }

    /// Run one loop iteration.
    ///
    /// Replies go to the port a request arrived on, unsolicited status goes to every port in
    /// `ports`.
    pub fn poll<P: Transport>(&mut self, ports: &mut [P]) {
        for origin in 0..ports.len() {
            let Some(payload) = poll_frame(ports[origin].rx()) else {
                continue;
            };
            match self.dispatch(&payload) {
                Dispatch::Silent => {}
                Dispatch::Reply(reply) => {
                    let port = &mut ports[origin];
                    write_frame(port.tx(), &reply);
                    port.start_transmit();
                }
                Dispatch::Broadcast(reply) => broadcast(ports, &[reply]),
            }
        }

        self.refresh_measurements();
        self.apply_outputs();

        let now = self.board.now();
        if let Some(event) = self.ramp.tick(
            now,
            &self.config,
            &mut self.channels,
            &mut self.filament,
            &mut self.board,
        ) {
            self.report_ramp(event, ports);
        }

        if let Some(flags) = self.interlock.check(
            &mut self.ramp,
            &mut self.channels,
            &mut self.filament,
            &mut self.board,
        ) {
            broadcast(ports, &[Reply::InsulationFailed(flags)]);
        }
    }

    /// Decode and execute one payload.
    pub fn dispatch(&mut self, payload: &[u8]) -> Dispatch {
        match Command::try_from(payload) {
            Ok(command) => self.execute(command),
            Err(()) => {
                debug!("Unknown command");
                Dispatch::Reply(Reply::Error)
            }
        }
    }

    /// Execute one command. Side effects are complete when this returns.
    pub fn execute(&mut self, command: Command) -> Dispatch {
        debug!("Executing {}", command);
        match command {
            Command::Identify => return Dispatch::Reply(Reply::Identify),
            Command::ReadVoltage(channel) => {
                return Dispatch::Reply(Reply::Voltage(channel, self.measured_volts(channel)));
            }
            Command::ReadCurrent(channel) => {
                return Dispatch::Reply(Reply::Current(channel, self.measured_current(channel)));
            }
            Command::ReadFilamentCurrent => {
                return Dispatch::Reply(Reply::FilamentCurrent(self.filament_milliamps()));
            }
            Command::ReportModes => {
                let modes = Channel::ALL.map(|ch| self.channel(ch).status_char());
                return Dispatch::Reply(Reply::Modes(modes));
            }
            Command::RawAdc => {
                let raw = self.channel(Channel::Cathode).measured_voltage;
                return Dispatch::Reply(Reply::RawSample(raw));
            }
            Command::ReportRampTargets => {
                return Dispatch::Reply(Reply::RampTargets(self.config.ramp_targets));
            }
            Command::ReportBeamOnLimits => {
                return Dispatch::Reply(Reply::BeamOnLimits(self.config.beam_on_current_limits));
            }
            Command::ReportInsulationLimits => {
                let limits = self.config.insulation_current_limits;
                return Dispatch::Reply(Reply::InsulationLimits(limits));
            }
            Command::ReportStepSizes => {
                return Dispatch::Reply(Reply::StepSizes {
                    voltage: self.config.voltage_step,
                    filament: self.config.filament_step,
                });
            }
            Command::ReportStepDurations => {
                return Dispatch::Reply(Reply::StepDurations {
                    voltage_ms: self.config.voltage_step_duration.to_millis(),
                    filament_ms: self.config.filament_step_duration.to_millis(),
                    initial_ms: self.config.initial_duration.to_millis(),
                });
            }
            Command::SetPolarity(channel, polarity) => {
                self.channels[channel.index()].polarity = polarity;
                self.cancel_ramp_for(channel);
            }
            Command::Enable(channel) => self.channels[channel.index()].enabled = true,
            Command::Disable(channel) => {
                self.channels[channel.index()].enabled = false;
                self.cancel_ramp_for(channel);
            }
            Command::SetVoltage(channel, volts) => {
                self.channels[channel.index()].voltage_setpoint = volts;
                self.cancel_ramp_for(channel);
            }
            Command::SetCurrentLimit(channel, microamps) => {
                self.channels[channel.index()].current_limit_setpoint = microamps;
                self.cancel_ramp_for(channel);
            }
            Command::AllOff => {
                self.channels.iter_mut().for_each(|c| c.enabled = false);
                self.filament.enabled = false;
                self.ramp.cancel();
                return Dispatch::Broadcast(Reply::Off);
            }
            Command::FilamentOn => self.filament.enabled = true,
            Command::FilamentOff => {
                self.filament.enabled = false;
                self.ramp.cancel();
            }
            Command::SetFilamentCurrent(value) => {
                self.filament.requested_current = value;
                self.filament.output_current = value;
                self.ramp.cancel();
            }
            Command::StartInsulationTest => {
                let now = self.board.now();
                self.ramp.start_insulation_test(
                    now,
                    &self.config,
                    &mut self.channels,
                    &mut self.filament,
                );
            }
            Command::StartBeamOn => {
                let now = self.board.now();
                self.ramp
                    .start_beam_on(now, &self.config, &mut self.channels, &mut self.filament);
            }
            Command::BeamHvOff => {
                for state in self.channels.iter_mut() {
                    state.enabled = false;
                    state.voltage_setpoint = 0;
                }
                self.ramp.cancel();
            }
            Command::DisableProtection => self.interlock.disable(),
            Command::Reset => {
                warn!("Reset requested");
                self.board.reset();
            }
        }
        Dispatch::Silent
    }

    /// Direct setpoint and switching commands abort a ramp, except on the aux channel.
    fn cancel_ramp_for(&mut self, channel: Channel) {
        if channel.cancels_ramp() {
            self.ramp.cancel();
        } else if self.ramp.is_active() {
            warn!("Channel {=u8} changed during a ramp, ramp continues", channel.number());
        }
    }

    fn refresh_measurements(&mut self) {
        for channel in Channel::iter() {
            let state = &mut self.channels[channel.index()];
            state.measured_voltage = self.board.read_channel_voltage(channel);
            state.measured_current = self.board.read_channel_current(channel);
            state.limiting_mode = self.board.read_limiting_mode(channel);
        }
        self.filament.measured_current = self.board.read_filament_current();
    }

    fn apply_outputs(&mut self) {
        for channel in Channel::iter() {
            let state = &self.channels[channel.index()];
            self.board
                .set_channel_output(channel, state.enabled, state.polarity);
            self.board.set_channel_voltage(channel, state.voltage_setpoint);
            self.board
                .set_channel_current_limit(channel, state.current_limit_setpoint);
        }
        self.board.set_filament_enabled(self.filament.enabled);
        self.board.set_filament_current(self.filament.output_current);
    }

    fn report_ramp<P: Transport>(&self, event: RampEvent, ports: &mut [P]) {
        match event {
            RampEvent::VoltagesStepped => {
                let reports = Channel::ALL.map(|ch| Reply::Voltage(ch, self.measured_volts(ch)));
                broadcast(ports, &reports);
            }
            RampEvent::FilamentStepped => {
                let progress = self
                    .filament
                    .enabled
                    .then(|| (self.filament.output_current, self.filament_milliamps()));
                broadcast(ports, &[Reply::FilamentProgress(progress)]);
            }
            RampEvent::InsulationTestPassed => broadcast(ports, &[Reply::InsulationOk]),
            RampEvent::BeamOnReached => broadcast(ports, &[Reply::BeamOn]),
        }
    }
}

fn broadcast<P: Transport>(ports: &mut [P], replies: &[Reply]) {
    for port in ports.iter_mut() {
        for reply in replies {
            write_frame(port.tx(), reply);
        }
        port.start_transmit();
    }
}
