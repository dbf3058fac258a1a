//! Custom error types for the crate.
//!
//! This module defines the primary error type, `DaqError`, shared by the transport, codec,
//! and device layers. Using the `thiserror` crate, it gives every failure a consistent shape
//! and keeps the offending raw data attached so callers can diagnose it.
//!
//! ## Error Hierarchy
//!
//! Each variant belongs to one of three categories, reported by [`DaqError::category`]:
//!
//! - **Configuration**: the request is invalid before any byte reaches the wire. A command
//!   code outside `[1, 999]`, a parameter outside its validated range, or a configuration
//!   file that fails to parse or validate.
//! - **Protocol**: a reply arrived but cannot be understood. The physical command may
//!   already have taken effect, so the raw reply is always included.
//! - **Transport**: the serial channel could not be opened, written, or read, or a bounded
//!   reply wait expired.
//!
//! Nothing in the crate retries. All errors propagate synchronously to the immediate caller.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Coarse classification of a [`DaqError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any I/O took place.
    Configuration,
    /// A reply was received but is malformed.
    Protocol,
    /// The channel failed or the reply never came.
    Transport,
}

/// Errors raised by the transport, codec, and device layers.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Numeric command code outside `[1, 999]`.
    #[error("Command code {0} out of bounds for [1, 999]")]
    InvalidCommandCode(u32),

    /// A command parameter failed range validation.
    #[error("Parameter {value} is outside of valid range [{min}, {max}]. Parameter was in the list of {values}")]
    ParameterOutOfRange {
        /// First offending value.
        value: String,
        /// Inclusive lower bound.
        min: String,
        /// Inclusive upper bound.
        max: String,
        /// The whole parameter list.
        values: String,
    },

    /// Configuration could not be extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Reply does not follow the device grammar.
    #[error("Malformed reply '{reply}': {reason}")]
    MalformedReply {
        /// Reply text as received.
        reply: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Reply bytes are not UTF-8.
    #[error("Reply is not valid UTF-8: {}", String::from_utf8_lossy(.raw).escape_default())]
    Decode {
        /// Frame as received.
        raw: Vec<u8>,
    },

    /// Channel read, write, or close failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Hardware port requested without the `instrument_serial` feature.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// Bounded reply wait expired.
    #[error("No reply to '{command}' within {waited:?}")]
    ReplyTimeout {
        /// Command that went unanswered.
        command: String,
        /// How long the transport waited.
        waited: Duration,
    },
}

impl DaqError {
    /// Build a malformed-reply error carrying the raw reply.
    pub fn malformed(reply: impl Into<String>, reason: impl Into<String>) -> Self {
        DaqError::MalformedReply {
            reply: reply.into(),
            reason: reason.into(),
        }
    }

    /// Which part of the error taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DaqError::InvalidCommandCode(_)
            | DaqError::ParameterOutOfRange { .. }
            | DaqError::Config(_)
            | DaqError::Configuration(_)
            | DaqError::SerialFeatureDisabled => ErrorCategory::Configuration,
            DaqError::MalformedReply { .. } | DaqError::Decode { .. } => ErrorCategory::Protocol,
            DaqError::Io(_) | DaqError::ReplyTimeout { .. } => ErrorCategory::Transport,
            #[cfg(feature = "instrument_serial")]
            DaqError::Serial(_) => ErrorCategory::Transport,
        }
    }
}
