//! WebSocket transport

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::{SinkExt, StreamExt};
use rsk_core::traits::{FrameSink, FrameStream, Transport};
use rsk_core::TransportError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Client side of a WebSocket connection; each frame is one binary message
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        tracing::debug!("Connecting to {}", self.url);
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.url, e)))?;
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
            .with(|frame: Bytes| future::ready(Ok::<_, TransportError>(Message::Binary(frame.to_vec()))));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                Ok(Message::Close(_)) => {
                    tracing::debug!("WebSocket closed by peer");
                    None
                }
                // Text frames are not part of the protocol; ping/pong is handled by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
