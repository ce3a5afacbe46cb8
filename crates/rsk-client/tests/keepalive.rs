//! Keepalive probing and answering, on paused time

mod common;

use std::sync::Arc;
use std::time::Duration;

use rsk_core::config::ConnectionConfig;
use rsk_core::traits::NoopResponder;
use rsk_core::ConnectionState;
use rsk_protocol::{FrameBuilder, FrameType};

fn fast_keepalive() -> ConnectionConfig {
    ConnectionConfig {
        keepalive_interval: Duration::from_secs(1),
        max_lifetime: Duration::from_secs(3),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_answered_probes_keep_connection_alive() {
    let mut h = common::connect_with(fast_keepalive(), Arc::new(NoopResponder)).await;
    let setup_len = h.setup.encode().len() as u64;

    for round in 0..3 {
        let probe = common::next_frame(&mut h.peer).await;
        assert_eq!(probe.frame_type(), FrameType::Keepalive);
        assert!(probe.respond_with_keepalive());
        let keepalive = probe.keepalive().unwrap();
        assert_eq!(keepalive.data.len(), 20);
        if round == 0 {
            // Only SETUP went out before the first probe
            assert_eq!(keepalive.last_received_position, setup_len);
        }

        h.peer
            .send(
                &FrameBuilder::keepalive()
                    .last_received_position(0)
                    .data(keepalive.data.clone())
                    .build(),
            )
            .unwrap();
    }
    assert_eq!(h.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_probe_fails_connection() {
    let mut h = common::connect_with(fast_keepalive(), Arc::new(NoopResponder)).await;
    let mut states = h.client.subscribe_state();

    let probe = common::next_frame(&mut h.peer).await;
    assert_eq!(probe.frame_type(), FrameType::Keepalive);

    // An answer with other data does not count
    h.peer
        .send(
            &FrameBuilder::keepalive()
                .last_received_position(0)
                .data(vec![0u8; 20])
                .build(),
        )
        .unwrap();

    assert_eq!(states.recv().await.unwrap(), ConnectionState::Error);
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Disconnected);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_peer_probe_is_echoed_with_receive_position() {
    let mut h = common::connect().await;
    let probe = FrameBuilder::keepalive()
        .flag_respond()
        .last_received_position(7)
        .data("ping")
        .build();
    let probe_len = probe.encode().len() as u64;
    h.peer.send(&probe).unwrap();

    let answer = common::next_frame(&mut h.peer).await;
    assert_eq!(answer.frame_type(), FrameType::Keepalive);
    assert!(!answer.respond_with_keepalive());
    let keepalive = answer.keepalive().unwrap();
    assert_eq!(keepalive.last_received_position, probe_len);
    assert_eq!(&keepalive.data[..], b"ping");
}
