//! In-memory transport
//!
//! [`LocalTransport`] connects a client to a [`LocalAcceptor`] in the same
//! process. The accepting side sees each connection as a [`LocalConnection`]
//! and exchanges raw frames with the client, which makes it usable both for
//! embedding a peer and for scripting one in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as frames;
use futures::{FutureExt, SinkExt, StreamExt};
use rsk_core::traits::{FrameSink, FrameStream, Transport};
use rsk_core::TransportError;
use rsk_protocol::{Frame, ProtocolError};
use tokio::sync::mpsc;

/// Client side of the in-memory transport
#[derive(Debug, Clone)]
pub struct LocalTransport {
    acceptor: mpsc::UnboundedSender<LocalConnection>,
}

/// Receives the connections opened through a [`LocalTransport`]
#[derive(Debug)]
pub struct LocalAcceptor {
    incoming: mpsc::UnboundedReceiver<LocalConnection>,
}

/// Accepting side of one in-memory connection
#[derive(Debug)]
pub struct LocalConnection {
    to_client: frames::UnboundedSender<Result<Bytes, TransportError>>,
    from_client: frames::UnboundedReceiver<Bytes>,
}

impl LocalTransport {
    pub fn new() -> (Self, LocalAcceptor) {
        let (acceptor, incoming) = mpsc::unbounded_channel();
        (Self { acceptor }, LocalAcceptor { incoming })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        let (client_tx, from_client) = frames::unbounded();
        let (to_client, client_rx) = frames::unbounded();

        self.acceptor
            .send(LocalConnection {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::ConnectFailed("local acceptor is gone".to_string()))?;

        let sink = client_tx.sink_map_err(|_| TransportError::Closed);
        Ok((Box::pin(sink), Box::pin(client_rx)))
    }
}

impl LocalAcceptor {
    /// Next connection; `None` once every transport handle is dropped
    pub async fn accept(&mut self) -> Option<LocalConnection> {
        self.incoming.recv().await
    }
}

impl LocalConnection {
    /// Send a frame to the client
    pub fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.send_raw(frame.encode())
    }

    /// Send arbitrary bytes as one frame message
    pub fn send_raw(&self, bytes: impl Into<Bytes>) -> Result<(), TransportError> {
        self.to_client
            .unbounded_send(Ok(bytes.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Make the client's transport stream fail with `err`
    pub fn fail(&self, err: TransportError) -> Result<(), TransportError> {
        self.to_client
            .unbounded_send(Err(err))
            .map_err(|_| TransportError::Closed)
    }

    /// Next frame from the client; `None` once the client closed its side
    pub async fn recv(&mut self) -> Option<Result<Frame, ProtocolError>> {
        self.recv_raw().await.map(Frame::decode)
    }

    /// Next frame message from the client, undecoded
    pub async fn recv_raw(&mut self) -> Option<Bytes> {
        self.from_client.next().await
    }

    /// Frame already sent by the client, without waiting
    pub fn try_recv(&mut self) -> Option<Result<Frame, ProtocolError>> {
        self.from_client
            .next()
            .now_or_never()
            .flatten()
            .map(Frame::decode)
    }

    /// Close the connection as if the network dropped it
    pub fn close(&self) {
        self.to_client.close_channel();
    }
}
