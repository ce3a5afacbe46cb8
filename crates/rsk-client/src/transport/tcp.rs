//! TCP transport with length-prefixed frames

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rsk_core::traits::{FrameSink, FrameStream, Transport};
use rsk_core::TransportError;
use rsk_protocol::FrameLengthCodec;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Raw TCP connection carrying frames behind a 24-bit length prefix
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
}

impl TcpTransport {
    /// `addr` is `host:port`
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        tracing::debug!("Connecting to tcp://{}", self.addr);
        let socket = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.addr, e)))?;
        socket.set_nodelay(true)?;

        let (sink, stream) = Framed::new(socket, FrameLengthCodec::new()).split();
        let sink = sink.sink_map_err(TransportError::from);
        let stream = stream.map(|frame| frame.map_err(TransportError::from));
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
