//! Interactions initiated by this side

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use rsk_core::RSocketError;
use rsk_protocol::{FragmentContext, FragmentState, Frame, FrameBuilder, Payload, ProtocolError, StreamId, MAX_REQUEST_N};
use tokio::sync::mpsc;

use super::{Multiplexer, StreamEvent};

/// Feed one PAYLOAD frame into a requester's reassembly state, emitting the
/// value once its last fragment has arrived
pub(super) fn deliver(
    events: &mpsc::UnboundedSender<StreamEvent>,
    fragments: &mut FragmentContext,
    frame: Frame,
) -> Result<(), ProtocolError> {
    if !frame.is_next() {
        if fragments.state() == FragmentState::Accumulating {
            return Err(ProtocolError::IncompletePayload);
        }
        return Ok(());
    }

    if fragments.state() == FragmentState::Empty && !frame.fragment_follows() {
        if let Some(payload) = frame.into_payload() {
            let _ = events.send(StreamEvent::Next(payload));
        }
        return Ok(());
    }

    fragments.add_frame(&frame)?;
    if !frame.fragment_follows() {
        let _ = events.send(StreamEvent::Next(fragments.get()?));
    }
    Ok(())
}

/// Releases a requester slot when the interaction ends or is abandoned.
///
/// Dropping an armed guard whose stream is still active sends CANCEL.
pub(super) struct RequesterGuard {
    mux: Arc<Multiplexer>,
    stream_id: StreamId,
    armed: bool,
}

impl RequesterGuard {
    fn new(mux: Arc<Multiplexer>, stream_id: StreamId) -> Self {
        Self {
            mux,
            stream_id,
            armed: false,
        }
    }

    /// The request frame reached the outbound queue
    fn arm(&mut self) {
        self.armed = true;
    }

    /// The interaction terminated normally
    fn finish(mut self) {
        self.armed = false;
    }
}

impl Drop for RequesterGuard {
    fn drop(&mut self) {
        if self.mux.release(self.stream_id) && self.armed {
            tracing::debug!(stream_id = %self.stream_id, "Cancelling abandoned stream");
            let _ = self.mux.outbound.send_cancel(self.stream_id);
        }
    }
}

impl Multiplexer {
    /// Send REQUEST_RESPONSE and wait for the single answer
    pub async fn request_response(self: &Arc<Self>, payload: Payload) -> Result<Payload, RSocketError> {
        let (stream_id, mut events) = self.register_requester()?;
        let mut guard = RequesterGuard::new(self.clone(), stream_id);
        self.outbound.send_fragmented(
            FrameBuilder::request_response()
                .stream_id(stream_id)
                .payload(payload),
        )?;
        guard.arm();

        let result = match events.recv().await {
            Some(StreamEvent::Next(payload)) => Ok(payload),
            // COMPLETE without a value
            Some(StreamEvent::Complete) => Ok(Payload::default()),
            Some(StreamEvent::Error(err)) => Err(err),
            None => Err(RSocketError::connection_closed("connection lost")),
        };
        guard.finish();
        result
    }

    /// Send REQUEST_FNF; no state is kept for the stream
    pub fn request_fnf(&self, payload: Payload) -> Result<(), RSocketError> {
        self.ensure_open()?;
        let stream_id = self.allocate_stream_id()?;
        self.outbound.send_fragmented(
            FrameBuilder::request_fnf()
                .stream_id(stream_id)
                .payload(payload),
        )
    }

    /// Create a lazily started REQUEST_STREAM driven by `demand`
    pub fn request_stream_with_demand(
        self: &Arc<Self>,
        payload: Payload,
        demand: BoxStream<'static, u32>,
    ) -> PayloadStream {
        PayloadStream {
            mux: self.clone(),
            request: Some(payload),
            demand: Some(demand),
            events: None,
            guard: None,
            done: false,
        }
    }
}

/// Items of a request-stream interaction.
///
/// Nothing is sent until the stream is first polled. Each value yielded by
/// the demand stream grants that many items to the responder: the first one
/// becomes the initial request count of REQUEST_STREAM, later ones are sent
/// as REQUEST_N. If the demand stream ends before yielding anything, the
/// request is never sent. Dropping the stream before it terminates cancels
/// the interaction.
pub struct PayloadStream {
    mux: Arc<Multiplexer>,
    request: Option<Payload>,
    demand: Option<BoxStream<'static, u32>>,
    events: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    guard: Option<RequesterGuard>,
    done: bool,
}

impl PayloadStream {
    /// Stream id, once the request has been sent
    pub fn stream_id(&self) -> Option<StreamId> {
        self.guard.as_ref().map(|guard| guard.stream_id)
    }

    fn request_more(&mut self, n: u32) -> Result<(), RSocketError> {
        let n = n.min(MAX_REQUEST_N);
        match self.request.take() {
            Some(payload) => {
                let (stream_id, events) = self.mux.register_requester()?;
                let mut guard = RequesterGuard::new(self.mux.clone(), stream_id);
                self.mux.outbound.send_fragmented(
                    FrameBuilder::request_stream()
                        .stream_id(stream_id)
                        .payload(payload)
                        .requests(n),
                )?;
                guard.arm();
                self.events = Some(events);
                self.guard = Some(guard);
            }
            None => {
                if let Some(guard) = &self.guard {
                    self.mux.outbound.send_request_n(guard.stream_id, n)?;
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.done = true;
        self.demand = None;
        self.events = None;
        if let Some(guard) = self.guard.take() {
            guard.finish();
        }
    }
}

impl Stream for PayloadStream {
    type Item = Result<Payload, RSocketError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        while let Some(demand) = this.demand.as_mut() {
            match demand.poll_next_unpin(cx) {
                Poll::Ready(Some(0)) => {}
                Poll::Ready(Some(n)) => {
                    if let Err(err) = this.request_more(n) {
                        this.finish();
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(None) => this.demand = None,
                Poll::Pending => break,
            }
        }

        let Some(events) = this.events.as_mut() else {
            if this.demand.is_none() {
                this.done = true;
                return Poll::Ready(None);
            }
            return Poll::Pending;
        };

        match events.poll_recv(cx) {
            Poll::Ready(Some(StreamEvent::Next(payload))) => Poll::Ready(Some(Ok(payload))),
            Poll::Ready(Some(StreamEvent::Complete)) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Error(err))) => {
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(Some(Err(RSocketError::connection_closed("connection lost"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Outbound;
    use futures::stream;
    use rsk_core::traits::NoopResponder;
    use rsk_protocol::FrameType;
    use tokio_util::sync::CancellationToken;

    fn multiplexer() -> (Arc<Multiplexer>, mpsc::UnboundedReceiver<Frame>) {
        let (outbound, rx) = Outbound::new(0);
        let mux = Multiplexer::new(outbound, Arc::new(NoopResponder), CancellationToken::new());
        (Arc::new(mux), rx)
    }

    fn next_frame(stream_id: StreamId, data: &str, complete: bool) -> Frame {
        let mut builder = FrameBuilder::payload()
            .stream_id(stream_id)
            .payload(Payload::from_data(data.to_string()))
            .flag_next();
        if complete {
            builder = builder.flag_complete();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_deliver_reassembles_fragments() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut fragments = FragmentContext::new();
        let frames = FrameBuilder::payload()
            .stream_id(StreamId::new(1))
            .payload(Payload::from_data(vec![1u8; 150]))
            .flag_next()
            .fragment_size(64)
            .build_fragments()
            .unwrap();
        assert_eq!(frames.len(), 3);

        for frame in frames {
            deliver(&tx, &mut fragments, frame).unwrap();
        }
        match rx.try_recv() {
            Ok(StreamEvent::Next(payload)) => assert_eq!(payload.data.len(), 150),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_request_response_completes() {
        let (mux, mut rx) = multiplexer();
        let call = tokio::spawn({
            let mux = mux.clone();
            async move { mux.request_response(Payload::from_data("ping")).await }
        });

        let request = rx.recv().await.unwrap();
        assert_eq!(request.frame_type(), FrameType::RequestResponse);
        mux.handle_frame(next_frame(request.stream_id(), "pong", true));

        let payload = call.await.unwrap().unwrap();
        assert_eq!(payload.data_utf8(), "pong");
        assert_eq!(mux.active_streams(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_request_response_abandoned_sends_cancel() {
        let (mux, mut rx) = multiplexer();
        let call = tokio::spawn({
            let mux = mux.clone();
            async move { mux.request_response(Payload::from_data("ping")).await }
        });

        let request = rx.recv().await.unwrap();
        call.abort();
        let _ = call.await;

        let cancel = rx.recv().await.unwrap();
        assert_eq!(cancel.frame_type(), FrameType::Cancel);
        assert_eq!(cancel.stream_id(), request.stream_id());
        assert_eq!(mux.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_demand_becomes_request_n() {
        let (mux, mut rx) = multiplexer();
        let mut items =
            mux.request_stream_with_demand(Payload::from_data("s"), stream::iter(vec![2, 0, 3]).boxed());

        // First poll sends the request and the follow-up credit
        assert!(futures::poll!(items.next()).is_pending());
        let request = rx.try_recv().unwrap();
        assert_eq!(request.frame_type(), FrameType::RequestStream);
        assert_eq!(request.request_n(), Some(2));
        let more = rx.try_recv().unwrap();
        assert_eq!(more.frame_type(), FrameType::RequestN);
        assert_eq!(more.request_n(), Some(3));

        let stream_id = request.stream_id();
        mux.handle_frame(next_frame(stream_id, "a", false));
        mux.handle_frame(next_frame(stream_id, "b", true));
        assert_eq!(items.next().await.unwrap().unwrap().data_utf8(), "a");
        assert_eq!(items.next().await.unwrap().unwrap().data_utf8(), "b");
        assert!(items.next().await.is_none());

        drop(items);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_without_demand_never_sends() {
        let (mux, mut rx) = multiplexer();
        let mut items = mux.request_stream_with_demand(Payload::from_data("s"), stream::empty().boxed());
        assert!(items.next().await.is_none());
        assert!(rx.try_recv().is_err());
    }
}
