//! Keepalive supervision
//!
//! One probe is outstanding at a time. Each probe carries a fresh random
//! nonce that the peer must echo back within the connection's max lifetime.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rsk_protocol::FrameBuilder;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::ConnectionCore;

/// Size of the random nonce carried by each probe
pub const NONCE_LENGTH: usize = 20;

/// Sends keepalive probes and fails the connection when they go unanswered
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveSupervisor {
    interval: Duration,
    max_lifetime: Duration,
}

impl KeepaliveSupervisor {
    pub fn new(interval: Duration, max_lifetime: Duration) -> Self {
        Self {
            interval,
            max_lifetime,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Run until the connection is cancelled or a probe times out.
    ///
    /// `acks` receives the data of every KEEPALIVE answer read from the peer.
    pub(crate) async fn run(self, core: Arc<ConnectionCore>, mut acks: mpsc::UnboundedReceiver<Bytes>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = core.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            // Answers to an earlier probe can no longer match
            while acks.try_recv().is_ok() {}

            let nonce = Bytes::copy_from_slice(&rand::random::<[u8; NONCE_LENGTH]>());
            let probe = FrameBuilder::keepalive()
                .flag_respond()
                .last_received_position(core.positions.sent())
                .data(nonce.clone())
                .build();
            tracing::debug!("Sending keepalive probe");
            if core.outbound.send(probe).is_err() {
                return;
            }

            let deadline = time::sleep(self.max_lifetime);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = core.cancel.cancelled() => return,
                    _ = &mut deadline => {
                        core.terminate(Some(&format!(
                            "no keepalive answer within {:?}",
                            self.max_lifetime
                        )));
                        return;
                    }
                    ack = acks.recv() => match ack {
                        Some(data) if data == nonce => {
                            tracing::trace!("Keepalive acknowledged");
                            break;
                        }
                        Some(data) => {
                            tracing::warn!(len = data.len(), "Ignoring keepalive answer with unexpected data");
                        }
                        None => return,
                    },
                }
            }
        }
    }
}
