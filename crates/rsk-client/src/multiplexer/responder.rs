//! Interactions initiated by the peer

use std::sync::Arc;

use rsk_protocol::{ErrorCode, FragmentContext, Frame, FrameType, Payload, StreamId};
use tokio::sync::mpsc;

use super::{Multiplexer, StreamSlot};
use crate::backpressure;

/// A fragmented request still being received
pub(crate) struct PendingRequest {
    frame_type: FrameType,
    initial_request_n: u32,
    fragments: FragmentContext,
}

/// Handle the first frame of a peer request
pub(super) fn accept_request(mux: &Arc<Multiplexer>, frame: Frame) {
    let stream_id = frame.stream_id();
    let frame_type = frame.frame_type();

    if mux.streams.contains_key(&stream_id) {
        tracing::warn!(
            stream_id = %stream_id,
            frame_type = %frame_type,
            "Ignoring request on a stream that is already active"
        );
        return;
    }

    if frame_type == FrameType::RequestChannel {
        tracing::debug!(stream_id = %stream_id, "Rejecting request-channel");
        let _ = mux
            .outbound
            .send_error(stream_id, ErrorCode::Rejected, "request-channel not supported");
        return;
    }

    let initial_request_n = frame.request_n().unwrap_or(0);

    if frame.fragment_follows() {
        let mut fragments = FragmentContext::new();
        if let Err(err) = fragments.add_frame(&frame) {
            let _ = mux
                .outbound
                .send_error(stream_id, ErrorCode::Invalid, err.to_string());
            return;
        }
        mux.streams.insert(
            stream_id,
            StreamSlot::Assembling(PendingRequest {
                frame_type,
                initial_request_n,
                fragments,
            }),
        );
        return;
    }

    let payload = frame.into_payload().unwrap_or_default();
    dispatch(mux, stream_id, frame_type, initial_request_n, payload);
}

/// Continuation frames of a fragmented peer request
pub(super) fn on_fragment(mux: &Arc<Multiplexer>, frame: Frame) {
    let stream_id = frame.stream_id();
    match frame.frame_type() {
        FrameType::Payload => {
            let added = match mux.streams.get_mut(&stream_id) {
                Some(mut slot) => match slot.value_mut() {
                    StreamSlot::Assembling(pending) => pending
                        .fragments
                        .add_frame(&frame)
                        .map(|()| !frame.fragment_follows()),
                    _ => return,
                },
                None => return,
            };

            match added {
                Ok(false) => {}
                Ok(true) => {
                    let Some((_, StreamSlot::Assembling(mut pending))) = mux.streams.remove(&stream_id)
                    else {
                        return;
                    };
                    match pending.fragments.get() {
                        Ok(payload) => dispatch(
                            mux,
                            stream_id,
                            pending.frame_type,
                            pending.initial_request_n,
                            payload,
                        ),
                        Err(err) => {
                            let _ = mux
                                .outbound
                                .send_error(stream_id, ErrorCode::Invalid, err.to_string());
                        }
                    }
                }
                Err(err) => mux.fail_stream(stream_id, err),
            }
        }
        FrameType::Cancel => {
            mux.streams.remove(&stream_id);
            tracing::debug!(stream_id = %stream_id, "Peer cancelled fragmented request");
        }
        other => {
            tracing::debug!(
                stream_id = %stream_id,
                frame_type = %other,
                "Ignoring frame on incomplete request"
            );
        }
    }
}

/// REQUEST_N, CANCEL and ERROR addressed to a stream this side serves
pub(super) fn on_signal(mux: &Arc<Multiplexer>, frame: Frame) {
    let stream_id = frame.stream_id();
    match frame.frame_type() {
        FrameType::RequestN => {
            let n = frame.request_n().unwrap_or(0);
            if let Some(slot) = mux.streams.get(&stream_id) {
                if let StreamSlot::Responder {
                    credits: Some(credits),
                    ..
                } = slot.value()
                {
                    let _ = credits.send(n);
                }
            }
        }
        FrameType::Cancel | FrameType::Error => {
            if let Some((_, StreamSlot::Responder { cancel, .. })) = mux.streams.remove(&stream_id) {
                tracing::debug!(stream_id = %stream_id, "Peer terminated served stream");
                cancel.cancel();
            }
        }
        other => {
            tracing::debug!(
                stream_id = %stream_id,
                frame_type = %other,
                "Ignoring frame on responder stream"
            );
        }
    }
}

fn dispatch(
    mux: &Arc<Multiplexer>,
    stream_id: StreamId,
    frame_type: FrameType,
    initial_request_n: u32,
    payload: Payload,
) {
    match frame_type {
        FrameType::RequestFnf => {
            let responder = mux.responder.clone();
            tokio::spawn(async move {
                responder.fire_and_forget(payload).await;
            });
        }
        FrameType::RequestResponse => serve_response(mux, stream_id, payload),
        FrameType::RequestStream => serve_stream(mux, stream_id, initial_request_n, payload),
        other => {
            tracing::warn!(stream_id = %stream_id, frame_type = %other, "Unexpected request type");
        }
    }
}

fn serve_response(mux: &Arc<Multiplexer>, stream_id: StreamId, payload: Payload) {
    let cancel = mux.cancel.child_token();
    mux.streams.insert(
        stream_id,
        StreamSlot::Responder {
            credits: None,
            cancel: cancel.clone(),
        },
    );

    let mux = mux.clone();
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(stream_id = %stream_id, "Request-response cancelled");
                return;
            }
            result = mux.responder.request_response(payload) => result,
        };

        // Cancelled while the handler was finishing
        if !mux.release(stream_id) {
            return;
        }
        let sent = match result {
            Ok(payload) => mux.outbound.send_next(stream_id, payload, true),
            Err(err) => mux.outbound.send_error(stream_id, err.code, err.message),
        };
        if let Err(err) = sent {
            tracing::debug!(stream_id = %stream_id, "Dropping response: {}", err);
        }
    });
}

fn serve_stream(mux: &Arc<Multiplexer>, stream_id: StreamId, initial_request_n: u32, payload: Payload) {
    let cancel = mux.cancel.child_token();
    let (credits_tx, credits_rx) = mpsc::unbounded_channel();
    mux.streams.insert(
        stream_id,
        StreamSlot::Responder {
            credits: Some(credits_tx),
            cancel: cancel.clone(),
        },
    );

    let served = mux.responder.request_stream(payload);
    let mux = mux.clone();
    tokio::spawn(async move {
        backpressure::serve_stream(
            &mux.outbound,
            stream_id,
            served,
            initial_request_n,
            credits_rx,
            cancel,
        )
        .await;
        mux.release(stream_id);
    });
}
