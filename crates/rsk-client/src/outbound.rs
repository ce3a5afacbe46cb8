//! Outbound frame queue and writer task
//!
//! All frames of a connection go through one unbounded queue consumed by a
//! single writer task, which serializes writes to the transport and keeps
//! the send position.

use std::sync::atomic::{AtomicU64, Ordering};

use futures::SinkExt;
use rsk_core::traits::FrameSink;
use rsk_core::{RSocketError, TransportError};
use rsk_protocol::builder::PayloadFrameBuilder;
use rsk_protocol::{ErrorCode, Frame, FrameBuilder, Payload, StreamId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Number of frame bytes written to and read from the transport
#[derive(Debug, Default)]
pub(crate) struct Positions {
    sent: AtomicU64,
    received: AtomicU64,
}

impl Positions {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    pub fn add_sent(&self, len: usize) {
        self.sent.fetch_add(len as u64, Ordering::AcqRel);
    }

    pub fn add_received(&self, len: usize) {
        self.received.fetch_add(len as u64, Ordering::AcqRel);
    }
}

/// Handle to the outbound frame queue
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    tx: mpsc::UnboundedSender<Frame>,
    fragment_size: usize,
}

impl Outbound {
    pub fn new(fragment_size: usize) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fragment_size }, rx)
    }

    pub fn send(&self, frame: Frame) -> Result<(), RSocketError> {
        self.tx
            .send(frame)
            .map_err(|_| RSocketError::connection_closed("outbound queue closed"))
    }

    /// Queue a payload-bearing frame, fragmented when above the fragment size
    pub fn send_fragmented(&self, builder: PayloadFrameBuilder) -> Result<(), RSocketError> {
        let frames = builder.fragment_size(self.fragment_size).build_fragments()?;
        for frame in frames {
            self.send(frame)?;
        }
        Ok(())
    }

    pub fn send_next(
        &self,
        stream_id: StreamId,
        payload: Payload,
        complete: bool,
    ) -> Result<(), RSocketError> {
        let mut builder = FrameBuilder::payload()
            .stream_id(stream_id)
            .payload(payload)
            .flag_next();
        if complete {
            builder = builder.flag_complete();
        }
        self.send_fragmented(builder)
    }

    pub fn send_complete(&self, stream_id: StreamId) -> Result<(), RSocketError> {
        let frame = FrameBuilder::payload()
            .stream_id(stream_id)
            .flag_complete()
            .build()?;
        self.send(frame)
    }

    pub fn send_error(
        &self,
        stream_id: StreamId,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<(), RSocketError> {
        let frame = FrameBuilder::error()
            .stream_id(stream_id)
            .error_code(code)
            .message(message)
            .build();
        self.send(frame)
    }

    pub fn send_cancel(&self, stream_id: StreamId) -> Result<(), RSocketError> {
        self.send(FrameBuilder::cancel().stream_id(stream_id).build()?)
    }

    pub fn send_request_n(&self, stream_id: StreamId, n: u32) -> Result<(), RSocketError> {
        self.send(
            FrameBuilder::request_n()
                .stream_id(stream_id)
                .requests(n)
                .build()?,
        )
    }
}

/// Write queued frames to the transport until cancelled or the queue closes.
///
/// Frames still queued at cancellation are flushed on a best-effort basis
/// before the sink is closed.
pub(crate) async fn run_writer(
    mut sink: FrameSink,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    positions: &Positions,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => write_frame(&mut sink, &frame, positions).await?,
                None => break,
            },
        }
    }

    while let Ok(frame) = rx.try_recv() {
        if write_frame(&mut sink, &frame, positions).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
    Ok(())
}

async fn write_frame(
    sink: &mut FrameSink,
    frame: &Frame,
    positions: &Positions,
) -> Result<(), TransportError> {
    let bytes = frame.encode();
    let len = bytes.len();
    tracing::trace!(
        stream_id = %frame.stream_id(),
        frame_type = %frame.frame_type(),
        len,
        "Sending frame"
    );
    sink.send(bytes).await?;
    positions.add_sent(len);
    Ok(())
}
