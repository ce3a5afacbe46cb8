//! Shared helpers: a client connected to a scripted in-memory peer

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rsk_client::{LocalAcceptor, LocalConnection, LocalTransport, RSocketClient};
use rsk_core::config::ConnectionConfig;
use rsk_core::traits::{NoopResponder, Responder};
use rsk_protocol::{Frame, FrameBuilder, FrameType, Payload, StreamId};

pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client and the peer end of its connection
pub struct Harness {
    pub client: RSocketClient,
    pub peer: LocalConnection,
    pub setup: Frame,
    pub acceptor: LocalAcceptor,
}

pub async fn connect() -> Harness {
    connect_with(ConnectionConfig::default(), Arc::new(NoopResponder)).await
}

pub async fn connect_with(config: ConnectionConfig, responder: Arc<dyn Responder>) -> Harness {
    let (transport, mut acceptor) = LocalTransport::new();
    let client = RSocketClient::connect(&transport, config, responder)
        .await
        .expect("connect over local transport");
    let mut peer = acceptor.accept().await.expect("accepted connection");
    let setup = next_frame(&mut peer).await;
    assert_eq!(setup.frame_type(), FrameType::Setup);
    Harness {
        client,
        peer,
        setup,
        acceptor,
    }
}

/// Next frame the client sent, failing the test if none arrives in time
pub async fn next_frame(peer: &mut LocalConnection) -> Frame {
    tokio::time::timeout(FRAME_TIMEOUT, peer.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed")
        .expect("client sent an undecodable frame")
}

/// Let spawned tasks run until they are idle
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn next(stream_id: StreamId, data: impl Into<String>) -> Frame {
    FrameBuilder::payload()
        .stream_id(stream_id)
        .payload(Payload::from_data(data.into()))
        .flag_next()
        .build()
        .unwrap()
}

pub fn next_complete(stream_id: StreamId, payload: Payload) -> Frame {
    FrameBuilder::payload()
        .stream_id(stream_id)
        .payload(payload)
        .flag_next()
        .flag_complete()
        .build()
        .unwrap()
}

pub fn complete(stream_id: StreamId) -> Frame {
    FrameBuilder::payload()
        .stream_id(stream_id)
        .flag_complete()
        .build()
        .unwrap()
}
