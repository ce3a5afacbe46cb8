//! Automatic reconnection
//!
//! [`ReconnectingClient`] keeps a connection alive by re-running the whole
//! connect pipeline after a fixed delay whenever connecting fails or the
//! connection drops, until it is closed.

use std::sync::Arc;
use std::time::Duration;

use rsk_core::config::ConnectionConfig;
use rsk_core::traits::{Responder, Transport};
use rsk_core::RSocketError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::RSocketClient;

/// Connection that re-establishes itself after failures
pub struct ReconnectingClient {
    current: watch::Receiver<Option<RSocketClient>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReconnectingClient {
    /// Start connecting in the background
    pub fn spawn(
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
        responder: Arc<dyn Responder>,
        delay: Duration,
    ) -> Self {
        let (publish, current) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            transport,
            config,
            responder,
            delay,
            publish,
            cancel.clone(),
        ));
        Self {
            current,
            cancel,
            task,
        }
    }

    /// The live client, if currently connected
    pub fn current(&self) -> Option<RSocketClient> {
        self.current
            .borrow()
            .as_ref()
            .filter(|client| client.state().is_connected())
            .cloned()
    }

    /// Client updates; `None` while no connection is established
    pub fn watch(&self) -> watch::Receiver<Option<RSocketClient>> {
        self.current.clone()
    }

    /// Wait for a connected client; `None` once reconnection has stopped
    pub async fn connected(&self) -> Option<RSocketClient> {
        let mut current = self.current.clone();
        loop {
            if let Some(client) = current.borrow_and_update().as_ref() {
                if client.state().is_connected() {
                    return Some(client.clone());
                }
            }
            if current.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Stop reconnecting and close the current connection
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn run(
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    responder: Arc<dyn Responder>,
    delay: Duration,
    publish: watch::Sender<Option<RSocketClient>>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let connecting = RSocketClient::connect(transport.as_ref(), config.clone(), responder.clone());
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connecting => result,
        };

        match result {
            Ok(client) => {
                tracing::info!(attempt, "Connected");
                attempt = 0;
                publish.send_replace(Some(client.clone()));
                tokio::select! {
                    _ = cancel.cancelled() => {
                        publish.send_replace(None);
                        client.close().await;
                        return;
                    }
                    _ = client.closed() => {}
                }
                publish.send_replace(None);
                tracing::warn!("Connection lost. Reconnecting in {:?}", delay);
            }
            Err(err @ (RSocketError::UnsupportedFeature(_) | RSocketError::Config(_))) => {
                tracing::error!("Not retrying: {}", err);
                return;
            }
            Err(err) => {
                tracing::warn!(attempt, "Connection failed: {}. Retrying in {:?}", err, delay);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
