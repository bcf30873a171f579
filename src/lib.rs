//! Controller firmware core for a multi-channel high-voltage electron-gun power supply.
//!
//! It regulates four independent voltage/current-limited supply channels (cathode, Wehnelt
//! cylinder, focus and an auxiliary channel) plus a filament current source, runs timed ramp
//! sequences (insulation test, beam on) guarded by an overcurrent interlock, and speaks a framed
//! line-oriented text protocol over any byte transport.
//!
//! It supports `no-std` environments by use of the `no-std` feature flag. Logging goes through
//! `defmt` when the `defmt` feature is enabled.
//!
//! Every message on the wire looks like this:
//! * Sync marker: `$$$`
//! * Payload: ASCII, case sensitive, e.g. `psusetv1500`
//! * Terminator: `\n`, optionally preceded by `\r`
//!
//! The hardware (sampling ADCs, duty-cycle outputs, monotonic clock) is reached through the
//! traits in [`hal`], so the same controller runs on the target and against a simulated plant.

#![cfg_attr(feature = "no-std", no_std)]

#[macro_use]
mod fmt;

pub mod channel;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod frame_buffer;
pub mod hal;
pub mod interlock;
pub mod protocol;
pub mod ramp;
pub mod scaling;
pub mod transport;

#[cfg(test)]
mod mock_board;
#[cfg(test)]
mod mock_serial;

pub use channel::{Channel, ChannelState, FilamentState, LimitingMode, Polarity};
pub use config::Config;
pub use controller::Controller;
pub use error::{Error, Result};
pub use frame_buffer::{ByteQueue, FrameBuffer, SharedFrameBuffer};
pub use hal::{Board, Monotonic, OutputStage, Sampler};
pub use ramp::{RampController, RampMode};
pub use transport::{BufferedPort, InterruptPort, Transport};
