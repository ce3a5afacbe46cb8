//! Transport traits

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, Stream};
use std::pin::Pin;

use crate::error::TransportError;

/// Outbound half of a connection: accepts one encoded frame per item
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = TransportError> + Send>>;

/// Inbound half of a connection: yields one encoded frame per item
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Message-oriented duplex byte channel carrying whole frames
///
/// Frame boundaries are preserved: every item written to the sink arrives as
/// exactly one item on the peer's stream. Closing the sink closes the
/// connection. Implementations may be connected several times, each call
/// opening a fresh connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError>;
}
