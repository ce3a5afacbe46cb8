//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol data
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame bytes are truncated or structurally invalid
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Unknown frame type in the frame header
    #[error("Unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    /// Well-known mime identifier not present in the registry
    #[error("Unknown well-known mime type identifier: {0:#04x}")]
    UnknownMimeType(u8),

    /// Well-known authentication identifier that is not implemented
    #[error("Unknown well-known authentication type: {0:#04x}")]
    UnknownAuthType(u8),

    /// Mime type string cannot be represented on the wire
    #[error("Invalid mime type {name:?}: {reason}")]
    InvalidMimeType { name: String, reason: &'static str },

    /// Mime type name or identifier already registered
    #[error("Mime type already registered: {0}")]
    DuplicateMimeType(String),

    /// Reassembled payload requested before the last fragment arrived
    #[error("Payload is incomplete: more fragments expected")]
    IncompletePayload,

    /// Fragment added to an already completed payload
    #[error("Fragment received after the payload was complete")]
    FragmentAfterComplete,

    /// Value does not fit the wire representation
    #[error("Cannot encode value: {0}")]
    Unencodable(String),

    /// Frame builder is missing a required field
    #[error("Cannot build frame: missing {0}")]
    MissingField(&'static str),

    /// Payload exceeds the allowed size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn truncated(what: &str, needed: usize, available: usize) -> Self {
        Self::Malformed(format!(
            "{}: expected {} bytes, got {}",
            what, needed, available
        ))
    }
}
