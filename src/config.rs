//! The persisted parameter block.
//!
//! One block holds the ramp targets, current limits, step sizes and intervals and the ADC
//! calibration. It is loaded once at boot and read-only afterwards.
//!
//! Layout (all little endian):
//! * checksum byte, chosen so the XOR over the whole block is zero
//! * magic `0xAA55`
//! * ramp targets, beam-on limits, insulation limits (4 x `u16` each)
//! * voltage step, filament step (`u16`)
//! * voltage step, initial and filament step durations (`u32` microseconds)
//! * per channel voltage gain/offset and current gain/offset (`f32`)
//! * filament midpoint (`u16`), gain and offset (`f32`)

use fugit::MicrosDurationU32;

use crate::channel::{CHANNEL_COUNT, Channel};
use crate::error::{ConfigError, Error, Result};
use crate::scaling::{Calibration, ChannelCalibration, FilamentCalibration};

/// Marks a written block.
pub const MAGIC: u16 = 0xAA55;

/// Size of an encoded block in bytes.
pub const ENCODED_LEN: usize = 1 + 2 + 3 * CHANNEL_COUNT * 2 + 2 * 2 + 3 * 4 + CHANNEL_COUNT * 16 + 10;

/// Runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Voltage each channel ramps to, in volts. Indexed by [`Channel::index`].
    pub ramp_targets: [u16; CHANNEL_COUNT],
    /// Current limits in microamps during a beam-on ramp and while the beam is on.
    pub beam_on_current_limits: [u16; CHANNEL_COUNT],
    /// Current limits in microamps during an insulation test.
    pub insulation_current_limits: [u16; CHANNEL_COUNT],
    /// Volts per ramp step.
    pub voltage_step: u16,
    /// Filament units per ramp step.
    pub filament_step: u16,
    pub voltage_step_duration: MicrosDurationU32,
    /// Wait between starting a ramp and its first voltage step.
    pub initial_duration: MicrosDurationU32,
    pub filament_step_duration: MicrosDurationU32,
    pub calibration: [ChannelCalibration; CHANNEL_COUNT],
    pub filament_calibration: FilamentCalibration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ramp_targets: [2018, 2020, 2060, 0],
            beam_on_current_limits: [1000, 1000, 1000, 10],
            insulation_current_limits: [10; CHANNEL_COUNT],
            voltage_step: 5,
            filament_step: 5,
            voltage_step_duration: MicrosDurationU32::millis(900),
            initial_duration: MicrosDurationU32::secs(10),
            filament_step_duration: MicrosDurationU32::millis(250),
            calibration: [ChannelCalibration::default(); CHANNEL_COUNT],
            filament_calibration: FilamentCalibration::default(),
        }
    }
}

/// Outcome of [`Config::load`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigLoad {
    /// The stored block was valid.
    Loaded(Config),
    /// The stored block was invalid and the defaults were substituted. The caller should
    /// [`Config::store`] them.
    Defaulted(Config, ConfigError),
}

impl ConfigLoad {
    pub fn config(&self) -> Config {
        match self {
            ConfigLoad::Loaded(config) | ConfigLoad::Defaulted(config, _) => *config,
        }
    }
}

impl Config {
    pub fn ramp_target(&self, channel: Channel) -> u16 {
        self.ramp_targets[channel.index()]
    }

    pub fn calibration(&self, channel: Channel) -> &ChannelCalibration {
        &self.calibration[channel.index()]
    }

    /// Reject values the ramp controller cannot work with.
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.voltage_step == 0 || self.filament_step == 0 {
            return Err(ConfigError::InvalidRange);
        }
        let mut gains = self
            .calibration
            .iter()
            .flat_map(|c| [c.voltage, c.current])
            .chain([self.filament_calibration.milliamps]);
        if gains.any(|c| !c.gain.is_finite() || !c.offset.is_finite()) {
            return Err(ConfigError::InvalidRange);
        }
        Ok(())
    }

    /// Serialize into a block ready for storage.
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut block = [0u8; ENCODED_LEN];
        let mut enc = Encoder::new(&mut block);

        enc.put_u8(0);
        enc.put_u16(MAGIC);
        self.ramp_targets.iter().for_each(|&v| enc.put_u16(v));
        self.beam_on_current_limits.iter().for_each(|&v| enc.put_u16(v));
        self.insulation_current_limits.iter().for_each(|&v| enc.put_u16(v));
        enc.put_u16(self.voltage_step);
        enc.put_u16(self.filament_step);
        enc.put_u32(self.voltage_step_duration.ticks());
        enc.put_u32(self.initial_duration.ticks());
        enc.put_u32(self.filament_step_duration.ticks());
        for cal in &self.calibration {
            enc.put_calibration(&cal.voltage);
            enc.put_calibration(&cal.current);
        }
        enc.put_u16(self.filament_calibration.midpoint);
        enc.put_calibration(&self.filament_calibration.milliamps);

        block[0] = block.iter().fold(0u8, |acc, b| acc ^ b);
        block
    }

    /// Parse a stored block, checking magic and checksum.
    pub fn decode(block: &[u8; ENCODED_LEN]) -> core::result::Result<Self, ConfigError> {
        let mut dec = Decoder::new(block);
        let _checksum = dec.u8();
        let magic = dec.u16();
        if magic != MAGIC {
            return Err(ConfigError::Magic(magic));
        }
        if block.iter().fold(0u8, |acc, b| acc ^ b) != 0 {
            return Err(ConfigError::Checksum);
        }

        let mut config = Config::default();
        config.ramp_targets.iter_mut().for_each(|v| *v = dec.u16());
        config.beam_on_current_limits.iter_mut().for_each(|v| *v = dec.u16());
        config.insulation_current_limits.iter_mut().for_each(|v| *v = dec.u16());
        config.voltage_step = dec.u16();
        config.filament_step = dec.u16();
        config.voltage_step_duration = MicrosDurationU32::from_ticks(dec.u32());
        config.initial_duration = MicrosDurationU32::from_ticks(dec.u32());
        config.filament_step_duration = MicrosDurationU32::from_ticks(dec.u32());
        for cal in config.calibration.iter_mut() {
            cal.voltage = dec.calibration();
            cal.current = dec.calibration();
        }
        config.filament_calibration.midpoint = dec.u16();
        config.filament_calibration.milliamps = dec.calibration();
        Ok(config)
    }

    /// Read one block from `reader`.
    ///
    /// A block that is corrupt, was never written or holds unusable values yields
    /// [`ConfigLoad::Defaulted`]. Only I/O failures are errors.
    pub fn load<R: embedded_io::Read>(reader: &mut R) -> Result<ConfigLoad, R::Error> {
        let mut block = [0u8; ENCODED_LEN];
        reader.read_exact(&mut block)?;

        match Config::decode(&block).and_then(|c| c.validate().map(|_| c)) {
            Ok(config) => {
                info!("Configuration loaded");
                Ok(ConfigLoad::Loaded(config))
            }
            Err(err) => {
                warn!("Configuration rejected ({}), using defaults", err);
                Ok(ConfigLoad::Defaulted(Config::default(), err))
            }
        }
    }

    /// Write this configuration as one block to `writer`.
    pub fn store<W: embedded_io::Write>(&self, writer: &mut W) -> Result<(), W::Error> {
        self.validate()?;
        writer.write_all(&self.encode()).map_err(Error::Interface)?;
        writer.flush().map_err(Error::Interface)?;
        debug!("Configuration stored");
        Ok(())
    }
}

struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    fn put_u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    fn put_calibration(&mut self, cal: &Calibration) {
        self.put(&cal.gain.to_le_bytes());
        self.put(&cal.offset.to_le_bytes());
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const L: usize>(&mut self) -> [u8; L] {
        let mut out = [0u8; L];
        out.copy_from_slice(&self.buf[self.pos..self.pos + L]);
        self.pos += L;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn calibration(&mut self) -> Calibration {
        let gain = self.f32();
        let offset = self.f32();
        Calibration::new(gain, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_serial::MockSerial;

    #[test]
    fn encoded_length_matches_layout() {
        assert_eq!(ENCODED_LEN, 117);
        let block = Config::default().encode();
        assert_eq!(block.iter().fold(0u8, |acc, b| acc ^ b), 0);
        assert_eq!(&block[1..3], &[0x55, 0xAA]);
    }

    #[test]
    fn decode_restores_every_field() {
        let mut config = Config::default();
        config.ramp_targets = [1500, 1510, 1600, 25];
        config.voltage_step = 10;
        config.initial_duration = MicrosDurationU32::secs(3);
        config.calibration[2].current = Calibration::new(8.5, -1.25);
        config.filament_calibration.midpoint = 500;

        assert_eq!(Config::decode(&config.encode()), Ok(config));
    }

    #[test]
    fn decode_rejects_corruption() {
        let mut block = Config::default().encode();
        block[10] ^= 0x01;
        assert_eq!(Config::decode(&block), Err(ConfigError::Checksum));

        let mut block = Config::default().encode();
        block[1] = 0xFF;
        assert_eq!(Config::decode(&block), Err(ConfigError::Magic(0xAAFF)));

        // Erased storage.
        let block = [0xFF; ENCODED_LEN];
        assert_eq!(Config::decode(&block), Err(ConfigError::Magic(0xFFFF)));
    }

    #[test]
    fn validate_rejects_zero_steps() {
        let mut config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        config.filament_step = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRange));

        let mut config = Config::default();
        config.calibration[0].voltage.gain = f32::NAN;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRange));
    }

    #[test]
    fn store_then_load() {
        let mut config = Config::default();
        config.beam_on_current_limits = [900, 900, 800, 5];

        let mut storage = MockSerial::new();
        config.store(&mut storage).unwrap();
        assert_eq!(storage.written_data().len(), ENCODED_LEN);

        let mut reader = MockSerial::new();
        reader.set_read_data(storage.written_data()).unwrap();
        assert_eq!(Config::load(&mut reader).unwrap(), ConfigLoad::Loaded(config));
    }

    #[test]
    fn load_substitutes_defaults() {
        let mut reader = MockSerial::new();
        reader.set_read_data(&[0u8; ENCODED_LEN]).unwrap();
        let loaded = Config::load(&mut reader).unwrap();
        assert_eq!(loaded, ConfigLoad::Defaulted(Config::default(), ConfigError::Magic(0)));
        assert_eq!(loaded.config(), Config::default());
    }

    #[test]
    fn load_of_short_block_is_an_error() {
        let mut reader = MockSerial::new();
        reader.set_read_data(&[0u8; 10]).unwrap();
        // The mock reports would-block once drained, which surfaces as an interface error.
        assert!(matches!(Config::load(&mut reader), Err(Error::Interface(_))));
    }

    #[test]
    fn store_refuses_invalid_config() {
        let mut config = Config::default();
        config.voltage_step = 0;
        let mut storage = MockSerial::new();
        assert!(matches!(
            config.store(&mut storage),
            Err(Error::Config(ConfigError::InvalidRange))
        ));
        assert!(storage.written_data().is_empty());
    }
}
