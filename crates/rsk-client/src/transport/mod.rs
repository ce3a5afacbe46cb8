//! Transport bindings
//!
//! Every transport carries whole encoded frames: WebSocket uses one binary
//! message per frame, TCP prefixes each frame with its 24-bit length and the
//! local transport passes buffers through in-memory channels.

mod local;
mod tcp;
mod websocket;

pub use local::{LocalAcceptor, LocalConnection, LocalTransport};
pub use tcp::TcpTransport;
pub use websocket::WebSocketTransport;

use std::sync::Arc;

use rsk_core::traits::Transport;
use rsk_core::TransportError;

/// Pick the transport for a server URL by its scheme
pub fn transport_for_url(url: &str) -> Result<Arc<dyn Transport>, TransportError> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(TransportError::InvalidAddress(format!("missing scheme in '{}'", url)));
    };
    if rest.is_empty() {
        return Err(TransportError::InvalidAddress(format!("missing host in '{}'", url)));
    }
    match scheme.to_ascii_lowercase().as_str() {
        "ws" | "wss" => Ok(Arc::new(WebSocketTransport::new(url))),
        "tcp" => Ok(Arc::new(TcpTransport::new(rest.trim_end_matches('/')))),
        other => Err(TransportError::InvalidAddress(format!(
            "unsupported scheme '{}', expected ws, wss or tcp",
            other
        ))),
    }
}
