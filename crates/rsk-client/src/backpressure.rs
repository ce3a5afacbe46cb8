//! Credit-based flow control for served streams
//!
//! A requester grants credit with the initial request count and later
//! REQUEST_N frames; each emitted item consumes one unit. A count of
//! `MAX_REQUEST_N` means unbounded demand and is never consumed.

use std::collections::VecDeque;

use futures::StreamExt;
use rsk_core::traits::{BackpressureStrategy, ResponderStream};
use rsk_protocol::{Payload, StreamId, MAX_REQUEST_N};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::outbound::Outbound;

/// Items a BufferDelay stream holds before it stops pulling from its source
pub const BUFFER_DELAY_CAPACITY: usize = 256;

/// Outstanding demand of a requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credit(u32);

impl Credit {
    pub fn new(n: u32) -> Self {
        Self(n.min(MAX_REQUEST_N))
    }

    /// Add demand; saturates at unbounded
    pub fn grant(&mut self, n: u32) {
        self.0 = self.0.saturating_add(n).min(MAX_REQUEST_N);
    }

    /// Consume one unit if available
    pub fn try_take(&mut self) -> bool {
        if self.is_unbounded() {
            return true;
        }
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }

    pub fn available(&self) -> u32 {
        self.0
    }

    pub fn is_unbounded(&self) -> bool {
        self.0 == MAX_REQUEST_N
    }
}

/// Emit the items of a served stream under the requester's credit.
///
/// Returns once the stream completed, failed or was cancelled. COMPLETE is
/// only sent after every buffered item went out; an application error is
/// sent as soon as the source yields it.
pub(crate) async fn serve_stream(
    outbound: &Outbound,
    stream_id: StreamId,
    served: ResponderStream,
    initial_request_n: u32,
    mut credits: mpsc::UnboundedReceiver<u32>,
    cancel: CancellationToken,
) {
    let ResponderStream {
        mut stream,
        backpressure,
    } = served;
    let mut credit = Credit::new(initial_request_n);
    let mut buffer: VecDeque<Payload> = VecDeque::new();
    let mut exhausted = false;
    let mut credits_open = true;

    tracing::debug!(
        stream_id = %stream_id,
        initial_request_n,
        ?backpressure,
        "Serving stream"
    );

    loop {
        while !buffer.is_empty() && credit.try_take() {
            if let Some(payload) = buffer.pop_front() {
                if outbound.send_next(stream_id, payload, false).is_err() {
                    return;
                }
            }
        }

        if exhausted && buffer.is_empty() {
            let _ = outbound.send_complete(stream_id);
            tracing::debug!(stream_id = %stream_id, "Served stream completed");
            return;
        }

        let can_pull = !exhausted && buffer.len() < BUFFER_DELAY_CAPACITY;

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(stream_id = %stream_id, "Served stream cancelled");
                return;
            }

            n = credits.recv(), if credits_open => match n {
                Some(n) => credit.grant(n),
                None => credits_open = false,
            },

            item = stream.next(), if can_pull => match item {
                Some(Ok(payload)) => match backpressure {
                    BackpressureStrategy::BufferDelay => buffer.push_back(payload),
                    BackpressureStrategy::Drop => {
                        if credit.try_take() {
                            if outbound.send_next(stream_id, payload, false).is_err() {
                                return;
                            }
                        } else {
                            tracing::trace!(stream_id = %stream_id, "Dropping item without credit");
                        }
                    }
                },
                Some(Err(err)) => {
                    tracing::debug!(stream_id = %stream_id, code = %err.code, "Served stream failed");
                    let _ = outbound.send_error(stream_id, err.code, err.message);
                    return;
                }
                None => exhausted = true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use rsk_core::ApplicationError;
    use rsk_protocol::{ErrorCode, Frame, FrameType};
    use tokio::sync::oneshot;

    fn items(n: usize) -> Vec<Result<Payload, ApplicationError>> {
        (0..n).map(|i| Ok(Payload::from_data(i.to_string()))).collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_credit_accounting() {
        let mut credit = Credit::new(2);
        assert!(credit.try_take());
        assert!(credit.try_take());
        assert!(!credit.try_take());
        credit.grant(1);
        assert_eq!(credit.available(), 1);

        let mut unbounded = Credit::new(u32::MAX);
        assert!(unbounded.is_unbounded());
        assert!(unbounded.try_take());
        assert!(unbounded.is_unbounded());

        let mut near = Credit::new(MAX_REQUEST_N - 1);
        near.grant(10);
        assert!(near.is_unbounded());
    }

    #[tokio::test]
    async fn test_buffer_delay_waits_for_credit() {
        let (outbound, mut rx) = Outbound::new(0);
        let (credits_tx, credits_rx) = mpsc::unbounded_channel();
        let served = ResponderStream::new(stream::iter(items(3)));
        let stream_id = StreamId::new(2);

        let task = tokio::spawn(async move {
            serve_stream(&outbound, stream_id, served, 1, credits_rx, CancellationToken::new()).await;
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload().unwrap().data_utf8(), "0");
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        credits_tx.send(2).unwrap();
        task.await.unwrap();

        let frames = drain(&mut rx);
        let values: Vec<String> = frames
            .iter()
            .filter(|f| f.is_next())
            .map(|f| f.payload().unwrap().data_utf8())
            .collect();
        assert_eq!(values, vec!["1", "2"]);
        assert!(frames.last().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_drop_discards_without_credit() {
        let (outbound, mut rx) = Outbound::new(0);
        let (_credits_tx, credits_rx) = mpsc::unbounded_channel();
        let served =
            ResponderStream::new(stream::iter(items(5))).with_backpressure(BackpressureStrategy::Drop);

        serve_stream(&outbound, StreamId::new(2), served, 1, credits_rx, CancellationToken::new()).await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload().unwrap().data_utf8(), "0");
        assert!(frames[1].is_complete() && !frames[1].is_next());
    }

    #[tokio::test]
    async fn test_drop_never_delivers_items_produced_without_credit() {
        let (outbound, mut rx) = Outbound::new(0);
        let (credits_tx, credits_rx) = mpsc::unbounded_channel();
        let (pulled_tx, pulled_rx) = oneshot::channel();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        // "b" is only produced once the test has granted credit
        let source = stream::once(async { Ok(Payload::from_data("a")) }).chain(stream::once(
            async move {
                let _ = pulled_tx.send(());
                let _ = gate_rx.await;
                Ok(Payload::from_data("b"))
            },
        ));
        let served = ResponderStream::new(source).with_backpressure(BackpressureStrategy::Drop);
        let task = tokio::spawn(async move {
            serve_stream(&outbound, StreamId::new(2), served, 0, credits_rx, CancellationToken::new())
                .await;
        });

        pulled_rx.await.unwrap();
        credits_tx.send(1).unwrap();
        gate_tx.send(()).unwrap();
        task.await.unwrap();

        let frames = drain(&mut rx);
        let values: Vec<String> = frames
            .iter()
            .filter(|f| f.is_next())
            .map(|f| f.payload().unwrap().data_utf8())
            .collect();
        assert_eq!(values, vec!["b"]);
        assert!(frames.last().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_error_is_sent_immediately() {
        let (outbound, mut rx) = Outbound::new(0);
        let (_credits_tx, credits_rx) = mpsc::unbounded_channel();
        let mut source = items(2);
        source.push(Err(ApplicationError::new("broken")));
        let served = ResponderStream::new(stream::iter(source));

        serve_stream(&outbound, StreamId::new(2), served, 0, credits_rx, CancellationToken::new()).await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), FrameType::Error);
        assert_eq!(frames[0].error().unwrap().code, ErrorCode::ApplicationError);
    }

    #[tokio::test]
    async fn test_cancel_stops_emission() {
        let (outbound, mut rx) = Outbound::new(0);
        let (_credits_tx, credits_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let served = ResponderStream::new(stream::iter(items(3)));

        serve_stream(&outbound, StreamId::new(2), served, MAX_REQUEST_N, credits_rx, cancel).await;
        assert!(drain(&mut rx).is_empty());
    }
}
