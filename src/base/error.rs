use std::error;
use std::fmt;
use std::io;

/// Represents errors that can occur while talking to a Sick PLS.
#[derive(Debug)]
pub enum Error {
    /// No reply arrived within the allotted time after all retries.
    Timeout,

    /// The serial device could not be opened, read, written, flushed,
    /// closed, or re-sped.
    Io(io::Error),

    /// A received frame failed CRC verification. Contains a description of
    /// where the mismatch was seen.
    Checksum { description: String },

    /// The device reports, or the driver detects, a parameter outside the
    /// supported set.
    Config { description: String },

    /// The device returned an error status or an unexpected telegram.
    Protocol { description: String },

    /// The buffer-monitor thread could not be started or stopped.
    Thread { description: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "operation timeout"),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Checksum { description } => write!(f, "bad checksum: {}", description),
            Error::Config { description } => write!(f, "config error: {}", description),
            Error::Protocol { description } => write!(f, "protocol error: {}", description),
            Error::Thread { description } => write!(f, "thread error: {}", description),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::Io(kind) => Error::Io(kind.into()),
            _ => Error::Io(io::Error::other(err.description)),
        }
    }
}

/// A specialized `Result` type for Sick PLS operations.
pub type Result<T> = std::result::Result<T, Error>;
