//! Error types for mapview-sync
//!
//! Every fault is classified exactly once, where it is produced, into a
//! [`Fault`]. Workers use that classification to decide between reconnecting
//! and giving up:
//!
//! | Fault | Examples | Worker reaction |
//! |-------|----------|-----------------|
//! | `Transient` | connection reset, timeout, EOF, failed save write | log, back off, retry |
//! | `Protocol` | unknown discriminator, undecodable envelope, oversized frame | log, drop connection, retry |
//! | `Fatal` | bad configuration, internal invariant broken | log, terminate the worker |

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// How a worker should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Expected network flakiness. Reconnect after a backoff.
    Transient,
    /// The peer sent something we cannot understand. Treated like a
    /// transient fault, but logged as a protocol violation.
    Protocol,
    /// A bug or unusable setup. Must not be swallowed.
    Fatal,
}

/// mapview-sync error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or stream I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host name could not be resolved to a socket address
    #[error("Could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    /// Envelope bytes are not valid protobuf
    #[error("Decode error: {0}")]
    Decode(String),

    /// Envelope decoded but a field violates a domain invariant
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Unknown TCP discriminator byte
    #[error("Unknown message type {0}")]
    UnknownMessage(u8),

    /// Length prefix larger than the configured maximum
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Received save could not be written to disk
    #[error("Failed to write save to {path:?}: {source}")]
    SaveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sync is turned off in the settings
    #[error("Sync disabled in settings")]
    Disabled,

    /// Worker thread could not be spawned
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for worker loops.
    pub fn fault(&self) -> Fault {
        match self {
            Error::Io(_) | Error::Resolve { .. } | Error::SaveWrite { .. } => Fault::Transient,
            Error::Decode(_)
            | Error::InvalidField { .. }
            | Error::UnknownMessage(_)
            | Error::FrameTooLarge { .. } => Fault::Protocol,
            Error::Config(_) | Error::Disabled | Error::Spawn { .. } | Error::Internal(_) => {
                Fault::Fatal
            }
        }
    }

    /// Shorthand for an [`Error::InvalidField`].
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
