//! rsk-client: RSocket client engine
//!
//! A single connection carries many concurrent interactions
//! (request-response, request-stream, fire-and-forget), each identified by
//! a stream id. This crate drives the connection: it multiplexes streams,
//! serves requests initiated by the peer, applies credit-based backpressure,
//! supervises keepalive and optionally reconnects.

pub mod backpressure;
pub mod client;
pub mod keepalive;
mod lifecycle;
pub mod multiplexer;
mod outbound;
pub mod reconnect;
pub mod transport;

pub use client::RSocketClient;
pub use multiplexer::PayloadStream;
pub use reconnect::ReconnectingClient;
pub use transport::{LocalAcceptor, LocalConnection, LocalTransport, TcpTransport, WebSocketTransport};
