//! Connection lifecycle
//!
//! Establishing a connection sends SETUP and spawns three tasks: the writer
//! draining the outbound queue, the reader dispatching inbound frames and
//! the keepalive supervisor. Teardown happens exactly once, whichever task
//! notices the failure first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use rsk_core::config::ConnectionConfig;
use rsk_core::traits::{FrameStream, Responder, Transport};
use rsk_core::{ConnectionState, RSocketError};
use rsk_protocol::{Flags, Frame, FrameBody, FrameBuilder, FrameType, ProtocolError, StreamId};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::keepalive::KeepaliveSupervisor;
use crate::multiplexer::Multiplexer;
use crate::outbound::{run_writer, Outbound, Positions};

const STATE_CHANNEL_CAPACITY: usize = 16;

/// Current connection state plus a log of transitions
#[derive(Debug)]
pub(crate) struct StateTracker {
    current: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (current, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            current,
            transitions,
        }
    }

    pub fn set(&self, state: ConnectionState) {
        tracing::info!(state = %state, "Connection state changed");
        self.current.send_replace(state);
        let _ = self.transitions.send(state);
    }

    pub fn get(&self) -> ConnectionState {
        *self.current.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.current.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }
}

/// Shared state of one established connection
pub(crate) struct ConnectionCore {
    pub config: ConnectionConfig,
    pub multiplexer: Arc<Multiplexer>,
    pub outbound: Outbound,
    pub positions: Arc<Positions>,
    pub state: StateTracker,
    pub cancel: CancellationToken,
    closed_by_user: AtomicBool,
    terminated: AtomicBool,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionCore {
    /// Tear the connection down; only the first call has an effect.
    ///
    /// `failure` carries the reason when the connection died rather than
    /// being closed by the user.
    pub fn terminate(&self, failure: Option<&str>) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let reason = match failure {
            Some(reason) if !self.closed_by_user.load(Ordering::Acquire) => {
                tracing::error!("Connection failed: {}", reason);
                self.state.set(ConnectionState::Error);
                reason
            }
            _ => "connection closed",
        };
        self.state.set(ConnectionState::Disconnected);
        self.multiplexer.fail_all(reason);
    }

    /// Close the connection on user request, flushing queued frames
    pub async fn close(&self) {
        self.closed_by_user.store(true, Ordering::Release);
        self.terminate(None);
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.await;
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Connect the transport, send SETUP and start the connection tasks
pub(crate) async fn establish(
    transport: &dyn Transport,
    config: ConnectionConfig,
    responder: Arc<dyn Responder>,
) -> Result<Arc<ConnectionCore>, RSocketError> {
    config.validate()?;
    let setup = setup_frame(&config)?;

    let (sink, stream) = transport.connect().await?;

    let cancel = CancellationToken::new();
    let (outbound, queue) = Outbound::new(config.fragment_size);
    let multiplexer = Arc::new(Multiplexer::new(outbound.clone(), responder, cancel.clone()));
    let core = Arc::new(ConnectionCore {
        config,
        multiplexer,
        outbound,
        positions: Arc::new(Positions::default()),
        state: StateTracker::new(),
        cancel,
        closed_by_user: AtomicBool::new(false),
        terminated: AtomicBool::new(false),
        writer: Mutex::new(None),
    });

    // SETUP is first in the queue, ahead of any request
    core.outbound.send(setup)?;

    // Must precede any transition published by the connection tasks
    core.state.set(ConnectionState::Connected);

    let writer = tokio::spawn({
        let core = core.clone();
        async move {
            let result = run_writer(sink, queue, &core.positions, core.cancel.clone()).await;
            if let Err(err) = result {
                core.terminate(Some(&format!("write failed: {}", err)));
            }
        }
    });
    *core.writer.lock().await = Some(writer);

    let (acks_tx, acks_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_reader(core.clone(), stream, acks_tx));

    let supervisor = KeepaliveSupervisor::new(core.config.keepalive_interval, core.config.max_lifetime);
    tokio::spawn(supervisor.run(core.clone(), acks_rx));

    Ok(core)
}

fn setup_frame(config: &ConnectionConfig) -> Result<Frame, RSocketError> {
    // Both durations were checked to fit in 31 bits
    let keepalive_ms = u32::try_from(config.keepalive_interval.as_millis()).unwrap_or(u32::MAX);
    let max_lifetime_ms = u32::try_from(config.max_lifetime.as_millis()).unwrap_or(u32::MAX);
    let frame = FrameBuilder::setup()
        .version(config.major_version, config.minor_version)
        .keepalive_ms(keepalive_ms)
        .max_lifetime_ms(max_lifetime_ms)
        .metadata_mime_type(config.metadata_mime_type.clone())
        .data_mime_type(config.data_mime_type.clone())
        .payload(config.setup_payload.clone())
        .build()?;
    Ok(frame)
}

async fn run_reader(
    core: Arc<ConnectionCore>,
    mut stream: FrameStream,
    acks: mpsc::UnboundedSender<Bytes>,
) {
    loop {
        let next = tokio::select! {
            _ = core.cancel.cancelled() => return,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                core.positions.add_received(bytes.len());
                handle_inbound(&core, bytes, &acks);
            }
            Some(Err(err)) => {
                core.terminate(Some(&format!("transport error: {}", err)));
                return;
            }
            None => {
                core.terminate(Some("transport closed"));
                return;
            }
        }
    }
}

fn handle_inbound(core: &Arc<ConnectionCore>, bytes: Bytes, acks: &mpsc::UnboundedSender<Bytes>) {
    let peeked = Frame::peek_stream_id(&bytes);
    let ignorable = Frame::peek_flags(&bytes).is_some_and(|flags| flags.contains(Flags::IGNORE));
    let frame = match Frame::decode(bytes) {
        Ok(frame) => frame,
        Err(ProtocolError::UnknownFrameType(frame_type)) if ignorable => {
            tracing::debug!(frame_type, "Ignoring frame of unknown type");
            return;
        }
        Err(err) => {
            match peeked {
                Some(stream_id) if !stream_id.is_connection() => {
                    core.multiplexer.fail_stream(stream_id, err)
                }
                _ => tracing::warn!("Discarding undecodable frame: {}", err),
            }
            return;
        }
    };

    tracing::trace!(
        stream_id = %frame.stream_id(),
        frame_type = %frame.frame_type(),
        "Received frame"
    );

    match frame.frame_type() {
        FrameType::Keepalive => on_keepalive(core, &frame, acks),
        FrameType::Error if frame.stream_id() == StreamId::CONNECTION => {
            let reason = match frame.error() {
                Some(body) => format!("peer error {}: {}", body.code, body.message),
                None => "peer error".to_string(),
            };
            core.terminate(Some(&reason));
        }
        FrameType::MetadataPush => {
            if let FrameBody::MetadataPush(metadata) = frame.into_body() {
                let responder = core.multiplexer.responder().clone();
                tokio::spawn(async move {
                    responder.metadata_push(metadata).await;
                });
            }
        }
        FrameType::Lease => {
            tracing::debug!("Ignoring LEASE frame");
        }
        other if other.is_connection_level() || frame.stream_id().is_connection() => {
            tracing::warn!(frame_type = %other, "Unexpected connection-level frame");
        }
        _ => core.multiplexer.handle_frame(frame),
    }
}

fn on_keepalive(core: &ConnectionCore, frame: &Frame, acks: &mpsc::UnboundedSender<Bytes>) {
    let Some(keepalive) = frame.keepalive() else {
        return;
    };
    if frame.respond_with_keepalive() {
        let answer = FrameBuilder::keepalive()
            .last_received_position(core.positions.received())
            .data(keepalive.data.clone())
            .build();
        let _ = core.outbound.send(answer);
    } else {
        let _ = acks.send(keepalive.data.clone());
    }
}
