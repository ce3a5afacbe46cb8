//! rsk-core: Core abstractions and configuration for rsk
//!
//! This crate provides the error taxonomy, connection state, configuration
//! structures and the transport/responder traits shared by the client engine
//! and the CLI.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ApplicationError, ConfigError, RSocketError, TransportError};
pub use types::ConnectionState;
