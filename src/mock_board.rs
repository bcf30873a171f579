//! A simulated board for unit tests: settable samples and clock, recorded outputs.

use fugit::MicrosDurationU32;

use crate::channel::{CHANNEL_COUNT, Channel, LimitingMode, Polarity};
use crate::hal::{Board, Monotonic, OutputStage, Sampler, Timestamp};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct OutputRecord {
    pub enabled: bool,
    pub polarity: Polarity,
    pub volts: u16,
    pub microamps: u16,
}

pub struct MockBoard {
    now: u32,
    pub voltage_samples: [u16; CHANNEL_COUNT],
    pub current_samples: [u16; CHANNEL_COUNT],
    pub limiting: [LimitingMode; CHANNEL_COUNT],
    pub filament_sample: u16,
    outputs: [OutputRecord; CHANNEL_COUNT],
    filament_enabled: bool,
    filament_current: u16,
    output_writes: usize,
    resets: usize,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            now: 0,
            voltage_samples: [0; CHANNEL_COUNT],
            current_samples: [0; CHANNEL_COUNT],
            limiting: [LimitingMode::VoltageRegulating; CHANNEL_COUNT],
            filament_sample: 512,
            outputs: [OutputRecord::default(); CHANNEL_COUNT],
            filament_enabled: false,
            filament_current: 0,
            output_writes: 0,
            resets: 0,
        }
    }

    pub fn clock(&self) -> Timestamp {
        Timestamp::from_ticks(self.now)
    }

    pub fn set_clock(&mut self, micros: u32) {
        self.now = micros;
    }

    pub fn advance(&mut self, duration: MicrosDurationU32) {
        self.now = self.now.wrapping_add(duration.ticks());
    }

    pub fn output(&self, channel: Channel) -> OutputRecord {
        self.outputs[channel.index()]
    }

    pub fn channel_voltage(&self, channel: Channel) -> u16 {
        self.outputs[channel.index()].volts
    }

    pub fn channel_current_limit(&self, channel: Channel) -> u16 {
        self.outputs[channel.index()].microamps
    }

    pub fn filament_enabled(&self) -> bool {
        self.filament_enabled
    }

    pub fn filament_current(&self) -> u16 {
        self.filament_current
    }

    /// Number of output stage calls so far.
    pub fn output_writes(&self) -> usize {
        self.output_writes
    }

    pub fn resets(&self) -> usize {
        self.resets
    }
}

impl Sampler for MockBoard {
    fn read_channel_voltage(&mut self, channel: Channel) -> u16 {
        self.voltage_samples[channel.index()]
    }

    fn read_channel_current(&mut self, channel: Channel) -> u16 {
        self.current_samples[channel.index()]
    }

    fn read_limiting_mode(&mut self, channel: Channel) -> LimitingMode {
        self.limiting[channel.index()]
    }

    fn read_filament_current(&mut self) -> u16 {
        self.filament_sample
    }
}

impl OutputStage for MockBoard {
    fn set_channel_output(&mut self, channel: Channel, enabled: bool, polarity: Polarity) {
        let out = &mut self.outputs[channel.index()];
        out.enabled = enabled;
        out.polarity = polarity;
        self.output_writes += 1;
    }

    fn set_channel_voltage(&mut self, channel: Channel, volts: u16) {
        self.outputs[channel.index()].volts = volts;
        self.output_writes += 1;
    }

    fn set_channel_current_limit(&mut self, channel: Channel, microamps: u16) {
        self.outputs[channel.index()].microamps = microamps;
        self.output_writes += 1;
    }

    fn set_filament_current(&mut self, value: u16) {
        self.filament_current = value;
        self.output_writes += 1;
    }

    fn set_filament_enabled(&mut self, enabled: bool) {
        self.filament_enabled = enabled;
        self.output_writes += 1;
    }
}

impl Monotonic for MockBoard {
    fn now(&mut self) -> Timestamp {
        self.clock()
    }
}

impl Board for MockBoard {
    fn reset(&mut self) {
        self.resets += 1;
    }
}
