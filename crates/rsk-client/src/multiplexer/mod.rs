//! Stream multiplexing over a single connection
//!
//! Every interaction owns a slot keyed by its stream id. Requester slots
//! forward inbound frames to the caller awaiting them; responder slots
//! forward credit and cancellation to the task serving the peer's request.

mod requester;
mod responder;

pub use requester::PayloadStream;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rsk_core::traits::Responder;
use rsk_core::RSocketError;
use rsk_protocol::stream_id::STREAM_ID_MASK;
use rsk_protocol::{ErrorCode, FragmentContext, Frame, FrameType, Payload, ProtocolError, StreamId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::outbound::Outbound;
use responder::PendingRequest;

/// Signal delivered to a requester
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Next(Payload),
    Complete,
    Error(RSocketError),
}

/// State of one active stream
pub(crate) enum StreamSlot {
    /// Interaction started by this side
    Requester {
        events: mpsc::UnboundedSender<StreamEvent>,
        fragments: FragmentContext,
    },
    /// Peer request being served
    Responder {
        credits: Option<mpsc::UnboundedSender<u32>>,
        cancel: CancellationToken,
    },
    /// Peer request whose fragments are still arriving
    Assembling(PendingRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Requester,
    Responder,
    Assembling,
}

impl StreamSlot {
    fn kind(&self) -> SlotKind {
        match self {
            StreamSlot::Requester { .. } => SlotKind::Requester,
            StreamSlot::Responder { .. } => SlotKind::Responder,
            StreamSlot::Assembling(_) => SlotKind::Assembling,
        }
    }
}

/// Routes frames between the connection and its interactions
pub(crate) struct Multiplexer {
    streams: DashMap<StreamId, StreamSlot>,
    next_stream_id: AtomicU32,
    outbound: Outbound,
    responder: Arc<dyn Responder>,
    cancel: CancellationToken,
}

impl Multiplexer {
    pub fn new(outbound: Outbound, responder: Arc<dyn Responder>, cancel: CancellationToken) -> Self {
        Self {
            streams: DashMap::new(),
            // Requester ids are odd: 1, 3, 5, ...
            next_stream_id: AtomicU32::new(1),
            outbound,
            responder,
            cancel,
        }
    }

    pub fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }

    /// Number of streams with live state
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    fn ensure_open(&self) -> Result<(), RSocketError> {
        if self.cancel.is_cancelled() {
            return Err(RSocketError::connection_closed("not connected"));
        }
        Ok(())
    }

    /// Allocate the next requester stream id; ids are never reused
    pub fn allocate_stream_id(&self) -> Result<StreamId, RSocketError> {
        let raw = self.next_stream_id.fetch_add(2, Ordering::SeqCst);
        if raw > STREAM_ID_MASK {
            return Err(RSocketError::Protocol(ProtocolError::Unencodable(
                "stream ids exhausted".to_string(),
            )));
        }
        Ok(StreamId::new(raw))
    }

    /// Allocate a stream id and register a requester slot for it
    pub fn register_requester(
        &self,
    ) -> Result<(StreamId, mpsc::UnboundedReceiver<StreamEvent>), RSocketError> {
        self.ensure_open()?;
        let stream_id = self.allocate_stream_id()?;
        let (events, rx) = mpsc::unbounded_channel();
        self.streams.insert(
            stream_id,
            StreamSlot::Requester {
                events,
                fragments: FragmentContext::new(),
            },
        );
        // Teardown may have drained the map between the check and the insert
        if self.cancel.is_cancelled() {
            self.streams.remove(&stream_id);
            return Err(RSocketError::connection_closed("not connected"));
        }
        Ok((stream_id, rx))
    }

    /// Drop the slot of a stream; returns whether it was still active
    pub fn release(&self, stream_id: StreamId) -> bool {
        self.streams.remove(&stream_id).is_some()
    }

    /// Route a decoded frame addressed to a non-zero stream
    pub fn handle_frame(self: &Arc<Self>, frame: Frame) {
        let stream_id = frame.stream_id();
        if frame.frame_type().is_request() {
            responder::accept_request(self, frame);
            return;
        }

        let kind = match self.streams.get(&stream_id) {
            Some(slot) => slot.kind(),
            None => {
                tracing::debug!(
                    stream_id = %stream_id,
                    frame_type = %frame.frame_type(),
                    "Ignoring frame for inactive stream"
                );
                return;
            }
        };

        match kind {
            SlotKind::Requester => self.on_requester_frame(frame),
            SlotKind::Responder => responder::on_signal(self, frame),
            SlotKind::Assembling => responder::on_fragment(self, frame),
        }
    }

    fn on_requester_frame(&self, frame: Frame) {
        let stream_id = frame.stream_id();
        match frame.frame_type() {
            FrameType::Payload if frame.is_complete() => {
                let Some((_, slot)) = self.streams.remove(&stream_id) else {
                    return;
                };
                if let StreamSlot::Requester {
                    events,
                    mut fragments,
                } = slot
                {
                    match requester::deliver(&events, &mut fragments, frame) {
                        Ok(()) => {
                            let _ = events.send(StreamEvent::Complete);
                        }
                        Err(err) => {
                            let _ = events.send(StreamEvent::Error(err.into()));
                        }
                    }
                }
            }
            FrameType::Payload => {
                let result = match self.streams.get_mut(&stream_id) {
                    Some(mut slot) => match slot.value_mut() {
                        StreamSlot::Requester { events, fragments } => {
                            requester::deliver(events, fragments, frame)
                        }
                        _ => Ok(()),
                    },
                    None => Ok(()),
                };
                if let Err(err) = result {
                    self.fail_stream(stream_id, err);
                }
            }
            FrameType::Error => {
                let Some((_, StreamSlot::Requester { events, .. })) = self.streams.remove(&stream_id)
                else {
                    return;
                };
                let (code, message) = match frame.error() {
                    Some(body) => (body.code, body.message.clone()),
                    None => (ErrorCode::ApplicationError, String::new()),
                };
                tracing::debug!(stream_id = %stream_id, code = %code, "Stream failed: {}", message);
                let _ = events.send(StreamEvent::Error(RSocketError::Application { code, message }));
            }
            other => {
                tracing::debug!(
                    stream_id = %stream_id,
                    frame_type = %other,
                    "Ignoring frame on requester stream"
                );
            }
        }
    }

    /// Fail one stream after a protocol violation, leaving the others running
    pub fn fail_stream(&self, stream_id: StreamId, err: ProtocolError) {
        tracing::warn!(stream_id = %stream_id, "Protocol error on stream: {}", err);
        match self.streams.remove(&stream_id) {
            Some((_, StreamSlot::Requester { events, .. })) => {
                let _ = self.outbound.send_cancel(stream_id);
                let _ = events.send(StreamEvent::Error(RSocketError::Protocol(err)));
            }
            Some((_, StreamSlot::Responder { cancel, .. })) => {
                cancel.cancel();
                let _ = self
                    .outbound
                    .send_error(stream_id, ErrorCode::Invalid, err.to_string());
            }
            Some((_, StreamSlot::Assembling(_))) => {
                let _ = self
                    .outbound
                    .send_error(stream_id, ErrorCode::Invalid, err.to_string());
            }
            None => {
                tracing::debug!(stream_id = %stream_id, "Malformed frame for inactive stream");
            }
        }
    }

    /// Fail every active interaction once the connection is gone
    pub fn fail_all(&self, reason: &str) {
        let ids: Vec<StreamId> = self.streams.iter().map(|slot| *slot.key()).collect();
        if !ids.is_empty() {
            tracing::debug!(streams = ids.len(), "Failing active streams: {}", reason);
        }
        for stream_id in ids {
            match self.streams.remove(&stream_id) {
                Some((_, StreamSlot::Requester { events, .. })) => {
                    let _ = events.send(StreamEvent::Error(RSocketError::connection_closed(reason)));
                }
                Some((_, StreamSlot::Responder { cancel, .. })) => cancel.cancel(),
                Some((_, StreamSlot::Assembling(_))) | None => {}
            }
        }
    }
}
