//! Decoding of request payloads.

use crate::channel::{Channel, Polarity};

/// A decoded request.
///
/// Commands are either bare keywords or a keyword immediately followed by its argument, e.g.
/// `psusetv1500` sets channel 1 to 500 V.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `id`
    Identify,
    /// `psugetv<N>`
    ReadVoltage(Channel),
    /// `psugeta<N>`
    ReadCurrent(Channel),
    /// `psupol<N><p|n>`
    SetPolarity(Channel, Polarity),
    /// `psuon<N>`
    Enable(Channel),
    /// `psuoff<N>`
    Disable(Channel),
    /// `off`
    AllOff,
    /// `filon`
    FilamentOn,
    /// `filoff`
    FilamentOff,
    /// `psumode`
    ReportModes,
    /// `psusetv<N><value>`
    SetVoltage(Channel, u16),
    /// `psuseta<N><value>`
    SetCurrentLimit(Channel, u16),
    /// Any payload starting with `fila`.
    ReadFilamentCurrent,
    /// `setfila<value>`
    SetFilamentCurrent(u16),
    /// `insul`
    StartInsulationTest,
    /// `beamon`
    StartBeamOn,
    /// `beamhvoff`
    BeamHvOff,
    /// `noprotection`
    DisableProtection,
    /// `reset`
    Reset,
    /// `rawadc`, the unscaled voltage sample of channel 1.
    RawAdc,
    /// `getvtarget`
    ReportRampTargets,
    /// `getbeamcurlim`
    ReportBeamOnLimits,
    /// `getinsulcurlim`
    ReportInsulationLimits,
    /// `getstepsizes`
    ReportStepSizes,
    /// `getdurations`
    ReportStepDurations,
}

impl TryFrom<&[u8]> for Command {
    type Error = ();

    /// Decode a payload. Matching is case sensitive. Unknown payloads yield `Err(())`.
    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let command = match payload {
            b"id" => Command::Identify,
            b"off" => Command::AllOff,
            b"filon" => Command::FilamentOn,
            b"filoff" => Command::FilamentOff,
            b"psumode" => Command::ReportModes,
            b"insul" => Command::StartInsulationTest,
            b"beamhvoff" => Command::BeamHvOff,
            b"beamon" => Command::StartBeamOn,
            b"noprotection" => Command::DisableProtection,
            b"reset" => Command::Reset,
            b"rawadc" => Command::RawAdc,
            b"getvtarget" => Command::ReportRampTargets,
            b"getbeamcurlim" => Command::ReportBeamOnLimits,
            b"getinsulcurlim" => Command::ReportInsulationLimits,
            b"getstepsizes" => Command::ReportStepSizes,
            b"getdurations" => Command::ReportStepDurations,
            [b'p', b's', b'u', b'g', b'e', b't', b'v', n] => Command::ReadVoltage(channel(*n)?),
            [b'p', b's', b'u', b'g', b'e', b't', b'a', n] => Command::ReadCurrent(channel(*n)?),
            [b'p', b's', b'u', b'p', b'o', b'l', n, p] => {
                Command::SetPolarity(channel(*n)?, polarity(*p)?)
            }
            [b'p', b's', b'u', b'o', b'n', n] => Command::Enable(channel(*n)?),
            [b'p', b's', b'u', b'o', b'f', b'f', n] => Command::Disable(channel(*n)?),
            [b'p', b's', b'u', b's', b'e', b't', b'v', n, value @ ..] => {
                Command::SetVoltage(channel(*n)?, parse_decimal(value))
            }
            [b'p', b's', b'u', b's', b'e', b't', b'a', n, value @ ..] => {
                Command::SetCurrentLimit(channel(*n)?, parse_decimal(value))
            }
            [b'f', b'i', b'l', b'a', ..] => Command::ReadFilamentCurrent,
            [b's', b'e', b't', b'f', b'i', b'l', b'a', value @ ..] => {
                Command::SetFilamentCurrent(parse_decimal(value))
            }
            _ => return Err(()),
        };
        Ok(command)
    }
}

fn channel(digit: u8) -> Result<Channel, ()> {
    digit
        .checked_sub(b'0')
        .and_then(Channel::from_number)
        .ok_or(())
}

fn polarity(c: u8) -> Result<Polarity, ()> {
    match c {
        b'p' => Ok(Polarity::Positive),
        b'n' => Ok(Polarity::Negative),
        _ => Err(()),
    }
}

/// Parse an unsigned decimal argument.
///
/// Non-digit bytes are skipped, the value saturates at `u16::MAX` and an empty argument is zero.
pub fn parse_decimal(digits: &[u8]) -> u16 {
    digits
        .iter()
        .filter(|b| b.is_ascii_digit())
        .fold(0u16, |acc, &b| {
            acc.saturating_mul(10).saturating_add(u16::from(b - b'0'))
        })
}
