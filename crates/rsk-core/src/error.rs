//! Core error types for rsk

use rsk_protocol::{ErrorCode, ProtocolError};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for RSocket interactions
#[derive(Error, Debug)]
pub enum RSocketError {
    /// Frame or metadata could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Peer answered with an ERROR frame
    #[error("Application error ({code}): {message}")]
    Application { code: ErrorCode, message: String },

    /// Connection is not established or was lost
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Requested a protocol feature this client does not implement
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RSocketError {
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed(reason.into())
    }

    /// Whether the error means the connection is gone
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Transport(_))
    }
}

impl From<ApplicationError> for RSocketError {
    fn from(err: ApplicationError) -> Self {
        Self::Application {
            code: err.code,
            message: err.message,
        }
    }
}

/// Transport-related errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Unsupported URL scheme or malformed address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Connection closed by the peer or the network
    #[error("Connection closed")]
    Closed,

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Framing error on a byte-stream transport
    #[error("Framing error: {0}")]
    Framing(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error produced by a responder handler and reported to the peer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApplicationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApplicationError {
    /// APPLICATION_ERROR with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ApplicationError,
            message: message.into(),
        }
    }

    /// REJECTED: the request was not processed
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Rejected,
            message: message.into(),
        }
    }

    /// INVALID: the request was malformed
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Invalid,
            message: message.into(),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
