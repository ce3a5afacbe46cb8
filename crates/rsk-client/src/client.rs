//! Public client handle

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use rsk_core::config::ConnectionConfig;
use rsk_core::traits::{Responder, Transport};
use rsk_core::{ConnectionState, RSocketError};
use rsk_protocol::{FrameBuilder, Payload, MAX_REQUEST_N};
use tokio::sync::{broadcast, watch};

use crate::lifecycle::{self, ConnectionCore};
use crate::multiplexer::PayloadStream;

/// Handle to one RSocket connection.
///
/// Cloning is cheap; the connection is torn down when the last clone is
/// dropped or [`close`](Self::close) is called.
#[derive(Clone)]
pub struct RSocketClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    core: Arc<ConnectionCore>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.core.terminate(None);
    }
}

impl RSocketClient {
    /// Open `transport`, send SETUP and start serving the connection.
    ///
    /// Requests initiated by the peer are handed to `responder`.
    pub async fn connect(
        transport: &dyn Transport,
        config: ConnectionConfig,
        responder: Arc<dyn Responder>,
    ) -> Result<Self, RSocketError> {
        let core = lifecycle::establish(transport, config, responder).await?;
        Ok(Self {
            inner: Arc::new(ClientInner { core }),
        })
    }

    fn core(&self) -> &Arc<ConnectionCore> {
        &self.inner.core
    }

    /// Send a request and wait for its single response
    pub async fn request_response(&self, payload: Payload) -> Result<Payload, RSocketError> {
        self.core().multiplexer.request_response(payload).await
    }

    /// Request a stream with unbounded demand
    pub fn request_stream(&self, payload: Payload) -> PayloadStream {
        self.request_stream_with_demand(payload, stream::once(async { MAX_REQUEST_N }))
    }

    /// Request a stream whose credit is granted by `demand`; see [`PayloadStream`]
    pub fn request_stream_with_demand<D>(&self, payload: Payload, demand: D) -> PayloadStream
    where
        D: Stream<Item = u32> + Send + 'static,
    {
        self.core()
            .multiplexer
            .request_stream_with_demand(payload, demand.boxed())
    }

    /// Send a request without expecting any answer
    pub fn request_fnf(&self, payload: Payload) -> Result<(), RSocketError> {
        self.core().multiplexer.request_fnf(payload)
    }

    /// Push connection-level metadata to the peer
    pub fn metadata_push(&self, metadata: impl Into<Bytes>) -> Result<(), RSocketError> {
        let core = self.core();
        if core.is_terminated() {
            return Err(RSocketError::connection_closed("not connected"));
        }
        core.outbound.send(FrameBuilder::metadata_push(metadata))
    }

    pub fn state(&self) -> ConnectionState {
        self.core().state.get()
    }

    /// Latest connection state
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.core().state.watch()
    }

    /// Every state transition from now on, including transient `Error`
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.core().state.subscribe()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.core().config
    }

    /// Number of interactions with live state
    pub fn active_streams(&self) -> usize {
        self.core().multiplexer.active_streams()
    }

    /// Close the connection, flushing frames already queued
    pub async fn close(&self) {
        self.core().close().await;
    }

    /// Wait until the connection is disconnected, for whatever reason
    pub async fn closed(&self) {
        let mut state = self.watch_state();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }
}

impl std::fmt::Debug for RSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RSocketClient")
            .field("state", &self.state())
            .field("active_streams", &self.active_streams())
            .finish()
    }
}
