//! Connection setup, teardown and automatic reconnection

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use rsk_client::{LocalTransport, RSocketClient, ReconnectingClient};
use rsk_core::config::ConnectionConfig;
use rsk_core::traits::{FrameSink, FrameStream, NoopResponder, Transport};
use rsk_core::{ConnectionState, RSocketError, TransportError};
use rsk_protocol::{ErrorCode, FrameBuilder, FrameType, Payload, StreamId};

#[tokio::test]
async fn test_close_is_clean() {
    let mut h = common::connect().await;
    let mut states = h.client.subscribe_state();

    h.client.close().await;

    assert_eq!(states.recv().await.unwrap(), ConnectionState::Disconnected);
    assert!(states.try_recv().is_err());
    assert!(h.peer.recv().await.is_none());

    assert!(matches!(
        h.client.request_response(Payload::from_data("x")).await,
        Err(RSocketError::ConnectionClosed(_))
    ));
    assert!(h.client.request_fnf(Payload::from_data("x")).is_err());
    assert!(h.client.metadata_push("m").is_err());
}

#[tokio::test]
async fn test_dropping_last_handle_closes_connection() {
    let mut h = common::connect().await;
    let watch = h.client.watch_state();
    drop(h.client);

    assert!(h.peer.recv().await.is_none());
    assert_eq!(*watch.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connection_error_tears_down() {
    let mut h = common::connect().await;
    let mut states = h.client.subscribe_state();
    let call = tokio::spawn({
        let client = h.client.clone();
        async move { client.request_response(Payload::from_data("x")).await }
    });
    common::next_frame(&mut h.peer).await;

    h.peer
        .send(
            &FrameBuilder::error()
                .stream_id(StreamId::CONNECTION)
                .error_code(ErrorCode::ConnectionError)
                .message("going away")
                .build(),
        )
        .unwrap();

    assert!(matches!(
        call.await.unwrap(),
        Err(RSocketError::ConnectionClosed(_))
    ));
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Error);
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Disconnected);
    h.client.closed().await;
}

#[tokio::test]
async fn test_transport_error_tears_down() {
    let h = common::connect().await;
    h.peer
        .fail(TransportError::WebSocket("reset by peer".to_string()))
        .unwrap();
    h.client.closed().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_lease_is_unsupported() {
    let (transport, mut acceptor) = LocalTransport::new();
    let config = ConnectionConfig {
        honors_lease: true,
        ..Default::default()
    };
    let result = RSocketClient::connect(&transport, config, Arc::new(NoopResponder)).await;
    assert!(matches!(result, Err(RSocketError::UnsupportedFeature("lease"))));
    // The transport was never opened
    assert!(acceptor.accept().now_or_never().is_none());
}

#[tokio::test]
async fn test_connect_failure() {
    let (transport, acceptor) = LocalTransport::new();
    drop(acceptor);
    let result =
        RSocketClient::connect(&transport, ConnectionConfig::default(), Arc::new(NoopResponder)).await;
    assert!(matches!(
        result,
        Err(RSocketError::Transport(TransportError::ConnectFailed(_)))
    ));
}

/// Accepts the connection, then fails every write
struct BrokenSink;

#[async_trait]
impl Transport for BrokenSink {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        let sink = futures::sink::unfold((), |(), _frame: Bytes| async {
            Err::<(), _>(TransportError::Closed)
        });
        let stream = futures::stream::pending::<Result<Bytes, TransportError>>();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_failure_during_connect_ends_disconnected() {
    // The test body runs outside the worker threads, like a CLI main
    for _ in 0..200 {
        let client = RSocketClient::connect(
            &BrokenSink,
            ConnectionConfig::default(),
            Arc::new(NoopResponder),
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), client.closed())
            .await
            .expect("connection never reached Disconnected");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}

#[tokio::test]
async fn test_unexpected_frames_are_ignored() {
    let mut h = common::connect().await;
    h.peer
        .send(&FrameBuilder::lease().ttl_ms(1000).number_of_requests(5).build())
        .unwrap();
    h.peer.send(&common::next(StreamId::new(41), "stray")).unwrap();
    h.peer.send_raw(vec![0u8; 3]).unwrap();

    h.client.request_fnf(Payload::from_data("still here")).unwrap();
    let frame = common::next_frame(&mut h.peer).await;
    assert_eq!(frame.frame_type(), FrameType::RequestFnf);
    assert!(h.client.state().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_connection_loss() {
    let (transport, mut acceptor) = LocalTransport::new();
    let reconnecting = ReconnectingClient::spawn(
        Arc::new(transport),
        ConnectionConfig::default(),
        Arc::new(NoopResponder),
        Duration::from_millis(500),
    );

    let first_peer = acceptor.accept().await.unwrap();
    let first = reconnecting.connected().await.unwrap();
    assert!(first.state().is_connected());

    first_peer.close();
    first.closed().await;

    let mut second_peer = acceptor.accept().await.unwrap();
    let setup = common::next_frame(&mut second_peer).await;
    assert_eq!(setup.frame_type(), FrameType::Setup);

    let second = reconnecting.connected().await.unwrap();
    second.request_fnf(Payload::from_data("again")).unwrap();
    let frame = common::next_frame(&mut second_peer).await;
    assert_eq!(frame.frame_type(), FrameType::RequestFnf);
    assert_eq!(frame.stream_id(), StreamId::new(1));

    drop(first);
    drop(second);
    reconnecting.close().await;
    assert!(second_peer.recv().await.is_none());
}
