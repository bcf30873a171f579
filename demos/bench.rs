//! Bench harness: runs the controller against a simulated supply on a real serial port.
//!
//! Usage: `bench [command-port] [display-port]`. Without arguments the command port is picked
//! interactively. Talk to it with any terminal, e.g. send `$$$insul\n`.

use std::env;
use std::fs::File;
use std::time::{Duration, Instant};

use electronctrl::channel::{CHANNEL_COUNT, Channel, LimitingMode, Polarity};
use electronctrl::config::{Config, ConfigLoad, ENCODED_LEN};
use electronctrl::hal::{Board, Monotonic, OutputStage, Sampler, Timestamp};
use electronctrl::{BufferedPort, Controller};
use inquire::Select;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 115200;
// Reads must return quickly, the control loop polls.
const SERIAL_TIMEOUT_MS: u64 = 5;
const CONFIG_PATH: &str = "electronctrl.cfg";
/// Simulated insulation resistance of each electrode.
const LOAD_MEGAOHMS: [u32; CHANNEL_COUNT] = [1000, 1000, 800, 1000];

/// Bridges a `std::io` device to `embedded-io`.
pub struct StdIo<T>(T);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::WouldBlock => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl<T> embedded_io::ErrorType for StdIo<T> {
    type Error = IoError;
}

impl<T: std::io::Read> embedded_io::Read for StdIo<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.read(buf).map_err(IoError)
    }
}

impl<T: std::io::Write> embedded_io::Write for StdIo<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().map_err(IoError)
    }
}

type SerialIo = StdIo<Box<dyn serialport::SerialPort>>;

#[derive(Default, Clone, Copy)]
struct SimChannel {
    enabled: bool,
    volts: u16,
    limit_microamps: u16,
}

/// A supply with a resistive load on every electrode.
struct SimBoard {
    start: Instant,
    config: Config,
    channels: [SimChannel; CHANNEL_COUNT],
    filament_enabled: bool,
    filament_setpoint: u16,
    reset_requested: bool,
}

impl SimBoard {
    fn new(config: Config) -> Self {
        Self {
            start: Instant::now(),
            config,
            channels: [SimChannel::default(); CHANNEL_COUNT],
            filament_enabled: false,
            filament_setpoint: 0,
            reset_requested: false,
        }
    }

    /// Output voltage and current (microamps) after current limiting.
    fn operating_point(&self, channel: Channel) -> (f32, f32, LimitingMode) {
        let sim = self.channels[channel.index()];
        if !sim.enabled {
            return (0.0, 0.0, LimitingMode::VoltageRegulating);
        }
        let load = LOAD_MEGAOHMS[channel.index()] as f32;
        let microamps = f32::from(sim.volts) / load;
        if microamps > f32::from(sim.limit_microamps) {
            let limit = f32::from(sim.limit_microamps);
            (limit * load, limit, LimitingMode::CurrentLimiting)
        } else {
            (f32::from(sim.volts), microamps, LimitingMode::VoltageRegulating)
        }
    }
}

impl Sampler for SimBoard {
    fn read_channel_voltage(&mut self, channel: Channel) -> u16 {
        let (volts, _, _) = self.operating_point(channel);
        (volts / self.config.calibration(channel).voltage.gain) as u16
    }

    fn read_channel_current(&mut self, channel: Channel) -> u16 {
        let (_, microamps, _) = self.operating_point(channel);
        // Reported in tenths of a microamp.
        (microamps * 10.0 / self.config.calibration(channel).current.gain) as u16
    }

    fn read_limiting_mode(&mut self, channel: Channel) -> LimitingMode {
        self.operating_point(channel).2
    }

    fn read_filament_current(&mut self) -> u16 {
        let calibration = &self.config.filament_calibration;
        let milliamps = if self.filament_enabled {
            f32::from(self.filament_setpoint)
        } else {
            0.0
        };
        calibration
            .midpoint
            .saturating_add((milliamps / calibration.milliamps.gain) as u16)
    }
}

impl OutputStage for SimBoard {
    fn set_channel_output(&mut self, channel: Channel, enabled: bool, _polarity: Polarity) {
        self.channels[channel.index()].enabled = enabled;
    }

    fn set_channel_voltage(&mut self, channel: Channel, volts: u16) {
        self.channels[channel.index()].volts = volts;
    }

    fn set_channel_current_limit(&mut self, channel: Channel, microamps: u16) {
        self.channels[channel.index()].limit_microamps = microamps;
    }

    fn set_filament_current(&mut self, value: u16) {
        self.filament_setpoint = value;
    }

    fn set_filament_enabled(&mut self, enabled: bool) {
        self.filament_enabled = enabled;
    }
}

impl Monotonic for SimBoard {
    fn now(&mut self) -> Timestamp {
        // Truncation wraps the clock like the hardware timer does.
        Timestamp::from_ticks(self.start.elapsed().as_micros() as u32)
    }
}

impl Board for SimBoard {
    fn reset(&mut self) {
        self.reset_requested = true;
    }
}

fn open_port(port_name: &str) -> SerialIo {
    let port = serialport::new(port_name, BAUD_RATE)
        .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");
    StdIo(port)
}

fn store_config(config: &Config) {
    let file = File::create(CONFIG_PATH).expect("Failed to create configuration file");
    config
        .store(&mut StdIo(file))
        .expect("Failed to store configuration");
    println!("Wrote {} byte block to {}", ENCODED_LEN, CONFIG_PATH);
}

/// Load the parameter block, writing the defaults back if it is missing or invalid.
fn load_config() -> Config {
    let Ok(file) = File::open(CONFIG_PATH) else {
        println!("No configuration at {}, using defaults", CONFIG_PATH);
        let config = Config::default();
        store_config(&config);
        return config;
    };

    match Config::load(&mut StdIo(file)) {
        Ok(ConfigLoad::Loaded(config)) => {
            println!("Loaded configuration from {}", CONFIG_PATH);
            config
        }
        Ok(ConfigLoad::Defaulted(config, reason)) => {
            println!("Invalid configuration ({}), using defaults", reason);
            store_config(&config);
            config
        }
        Err(e) => {
            println!("Could not read {}: {}, using defaults", CONFIG_PATH, e);
            Config::default()
        }
    }
}

fn main() {
    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        // List available serial ports
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        // Interactive selection
        Select::new("Select the command port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });
    let display_name = env::args().nth(2);

    println!("Command port: {}", port_name);
    let mut ports: [BufferedPort<SerialIo, 256>; 1] = [BufferedPort::new(open_port(&port_name))];
    let mut display: Option<BufferedPort<SerialIo, 64>> = display_name.map(|name| {
        println!("Display port: {}", name);
        BufferedPort::new(open_port(&name))
    });

    let config = load_config();
    let mut controller = Controller::new(SimBoard::new(config), config);

    loop {
        for port in ports.iter_mut() {
            if let Err(e) = port.pump() {
                eprintln!("Command port error: {}", e);
            }
        }

        controller.poll(&mut ports);

        if let Some(display) = display.as_mut() {
            controller.serve_display(display);
            if let Err(e) = display.pump() {
                eprintln!("Display port error: {}", e);
            }
        }

        if controller.board().reset_requested {
            println!("Reset requested, restarting controller");
            controller = Controller::new(SimBoard::new(config), config);
        }
    }
}
