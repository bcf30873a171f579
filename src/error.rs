//! Our error types for the controller.
//!
//! Protocol problems (noise, unknown commands, safety trips) are never errors in this sense, they
//! are answered on the wire. What remains are failures of the underlying byte interface and of
//! the persisted configuration block.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for the electron-gun controller.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Interface I/O error")]
    Interface(I),
    #[error("Configuration block truncated")]
    UnexpectedEof,
    #[error("Invalid configuration: {0}")]
    Config(ConfigError),
    #[error("Interface accepted no data")]
    WriteZero,
}

/// Problems with a configuration block, independent of where it was read from.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("checksum mismatch")]
    Checksum,
    #[error("magic mismatch ({0:#06x})")]
    Magic(u16),
    #[error("invalid range")]
    InvalidRange,
}

impl<I: embedded_io::Error> From<ConfigError> for Error<I> {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl<I: embedded_io::Error> From<embedded_io::ReadExactError<I>> for Error<I> {
    fn from(err: embedded_io::ReadExactError<I>) -> Self {
        match err {
            embedded_io::ReadExactError::UnexpectedEof => Error::UnexpectedEof,
            embedded_io::ReadExactError::Other(inner) => Error::Interface(inner),
        }
    }
}
