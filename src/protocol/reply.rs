//! Replies and unsolicited status messages.

use core::fmt::{self, Write};

use modular_bitfield::prelude::*;
use strum::IntoEnumIterator;

use super::{FIRMWARE_ID, SYNC_BYTE, SYNC_LEN, TERMINATOR};
use crate::channel::{CHANNEL_COUNT, Channel};
use crate::frame_buffer::ByteQueue;

/// Channels found in current limiting by the overcurrent interlock.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultFlags {
    pub cathode: bool,
    pub wehnelt: bool,
    pub focus: bool,
    pub aux: bool,
    #[skip]
    __: B4,
}

impl FaultFlags {
    pub fn is_set(&self, channel: Channel) -> bool {
        match channel {
            Channel::Cathode => self.cathode(),
            Channel::Wehnelt => self.wehnelt(),
            Channel::Focus => self.focus(),
            Channel::Aux => self.aux(),
        }
    }

    pub fn flag(&mut self, channel: Channel) {
        match channel {
            Channel::Cathode => self.set_cathode(true),
            Channel::Wehnelt => self.set_wehnelt(true),
            Channel::Focus => self.set_focus(true),
            Channel::Aux => self.set_aux(true),
        }
    }

    pub fn any(&self) -> bool {
        self.into_bytes()[0] != 0
    }
}

/// Everything the controller ever sends on a command port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `electronctrl_<version>`
    Identify,
    /// `err`, the request was not understood.
    Error,
    /// `v<N>:<volts>`
    Voltage(Channel, u16),
    /// `a<N>:<tenths of a microamp>`
    Current(Channel, u16),
    /// `psustate` followed by one status character per channel.
    Modes([u8; CHANNEL_COUNT]),
    /// `af:<mA>`
    FilamentCurrent(u16),
    /// `filseta:<set>:<mA>` while the filament is on, `filseta:disabled` otherwise.
    FilamentProgress(Option<(u16, u16)>),
    /// `insulok`
    InsulationOk,
    /// `insulfailed:` followed by `F` (fault) or `-` per channel.
    InsulationFailed(FaultFlags),
    /// `beamon`
    BeamOn,
    /// `off`
    Off,
    /// A bare decimal number, the answer to `rawadc`.
    RawSample(u16),
    /// `vtargets:<v1>:<v2>:<v3>:<v4>`
    RampTargets([u16; CHANNEL_COUNT]),
    /// `beamcurlim:<a1>:<a2>:<a3>:<a4>`
    BeamOnLimits([u16; CHANNEL_COUNT]),
    /// `insulcurlim:<a1>:<a2>:<a3>:<a4>`
    InsulationLimits([u16; CHANNEL_COUNT]),
    /// `rampsteps:<volts>:<filament>`
    StepSizes { voltage: u16, filament: u16 },
    /// `rampdurations:<voltage step>:<filament step>:<initial delay>`, all in milliseconds.
    StepDurations {
        voltage_ms: u32,
        filament_ms: u32,
        initial_ms: u32,
    },
}

impl fmt::Display for Reply {
    /// Formats the payload only, without marker and terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Identify => f.write_str(FIRMWARE_ID),
            Reply::Error => f.write_str("err"),
            Reply::Voltage(channel, volts) => write!(f, "v{}:{}", channel.number(), volts),
            Reply::Current(channel, current) => write!(f, "a{}:{}", channel.number(), current),
            Reply::Modes(modes) => {
                f.write_str("psustate")?;
                modes.iter().try_for_each(|&c| f.write_char(char::from(c)))
            }
            Reply::FilamentCurrent(milliamps) => write!(f, "af:{}", milliamps),
            Reply::FilamentProgress(Some((set, measured))) => {
                write!(f, "filseta:{}:{}", set, measured)
            }
            Reply::FilamentProgress(None) => f.write_str("filseta:disabled"),
            Reply::InsulationOk => f.write_str("insulok"),
            Reply::InsulationFailed(flags) => {
                f.write_str("insulfailed:")?;
                Channel::iter()
                    .try_for_each(|ch| f.write_char(if flags.is_set(ch) { 'F' } else { '-' }))
            }
            Reply::BeamOn => f.write_str("beamon"),
            Reply::Off => f.write_str("off"),
            Reply::RawSample(value) => write!(f, "{}", value),
            Reply::RampTargets(values) => write_list(f, "vtargets", values),
            Reply::BeamOnLimits(values) => write_list(f, "beamcurlim", values),
            Reply::InsulationLimits(values) => write_list(f, "insulcurlim", values),
            Reply::StepSizes { voltage, filament } => {
                write!(f, "rampsteps:{}:{}", voltage, filament)
            }
            Reply::StepDurations {
                voltage_ms,
                filament_ms,
                initial_ms,
            } => write!(f, "rampdurations:{}:{}:{}", voltage_ms, filament_ms, initial_ms),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, values: &[u16]) -> fmt::Result {
    f.write_str(name)?;
    values.iter().try_for_each(|value| write!(f, ":{}", value))
}

/// Adapter letting `core::fmt` write straight into a byte queue.
///
/// Bytes that do not fit are dropped, formatting itself never fails.
struct QueueWriter<'a, Q: ByteQueue>(&'a mut Q);

impl<Q: ByteQueue> Write for QueueWriter<'_, Q> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.push_all(s.as_bytes());
        Ok(())
    }
}

/// Append one framed reply to `tx`.
///
/// The caller is responsible for starting transmission afterwards.
pub fn write_frame<Q: ByteQueue>(tx: &mut Q, reply: &Reply) {
    tx.push_all(&[SYNC_BYTE; SYNC_LEN]);
    // QueueWriter never reports an error.
    let _ = write!(QueueWriter(tx), "{}", reply);
    tx.push(TERMINATOR);
}

/// Append an unframed line to `tx`, as used by the status display port.
pub fn write_line<Q: ByteQueue>(tx: &mut Q, args: fmt::Arguments<'_>) {
    let mut writer = QueueWriter(tx);
    let _ = writer.write_fmt(args);
    let _ = writer.write_str("\r\n");
}
