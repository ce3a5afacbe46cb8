//! Responder traits
//!
//! A [`Responder`] serves the requests a peer initiates over a connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use rsk_protocol::Payload;
use std::fmt;
use std::pin::Pin;

use crate::error::ApplicationError;

/// How a served stream handles items produced while the requester has no credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    /// Buffer items and release one per unit of credit
    #[default]
    BufferDelay,
    /// Discard items until credit is available
    Drop,
}

/// Items of a served stream
pub type ResponderItems = Pin<Box<dyn Stream<Item = Result<Payload, ApplicationError>> + Send>>;

/// A served stream together with its backpressure strategy
pub struct ResponderStream {
    pub stream: ResponderItems,
    pub backpressure: BackpressureStrategy,
}

impl ResponderStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Payload, ApplicationError>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
            backpressure: BackpressureStrategy::default(),
        }
    }

    pub fn with_backpressure(mut self, backpressure: BackpressureStrategy) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Stream that terminates immediately with `err`
    pub fn error(err: ApplicationError) -> Self {
        Self::new(stream::once(async move { Err(err) }))
    }

    /// Stream that completes without items
    pub fn empty() -> Self {
        Self::new(stream::empty())
    }
}

impl fmt::Debug for ResponderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderStream")
            .field("backpressure", &self.backpressure)
            .finish_non_exhaustive()
    }
}

/// Handlers for peer-initiated interactions
///
/// Every method has a default: request-response and request-stream reject
/// the request, fire-and-forget and metadata push do nothing.
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    async fn request_response(&self, _payload: Payload) -> Result<Payload, ApplicationError> {
        Err(ApplicationError::rejected("request-response not supported"))
    }

    fn request_stream(&self, _payload: Payload) -> ResponderStream {
        ResponderStream::error(ApplicationError::rejected("request-stream not supported"))
    }

    async fn fire_and_forget(&self, _payload: Payload) {}

    async fn metadata_push(&self, _metadata: Bytes) {}
}

/// Responder that uses every default
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResponder;

impl Responder for NoopResponder {}
