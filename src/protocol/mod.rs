//! The framed text protocol spoken on every command port.
//!
//! * [`framer`] turns a noisy receive queue into payloads.
//! * [`command`] decodes a payload into a [`Command`].
//! * [`reply`] formats replies and unsolicited status lines back into a transmit queue.

pub mod command;
pub mod framer;
pub mod reply;

pub use command::Command;
pub use framer::{Payload, poll_frame};
pub use reply::{FaultFlags, Reply, write_frame, write_line};

/// Marker byte, repeated three times at the start of every frame.
pub const SYNC_BYTE: u8 = b'$';

/// Length of the sync marker.
pub const SYNC_LEN: usize = 3;

/// Frame terminator.
pub const TERMINATOR: u8 = b'\n';

/// Optional byte in front of the terminator.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Largest payload the framer hands out.
pub const MAX_PAYLOAD: usize = 64;

/// Identification string sent in response to `id`.
pub const FIRMWARE_ID: &str = "electronctrl_20210819_001";
