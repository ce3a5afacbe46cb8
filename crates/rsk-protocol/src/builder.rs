//! Fluent frame construction
//!
//! Builders validate required fields (a request needs a stream id, a
//! REQUEST_STREAM needs an initial request count) and the wire limits of the
//! frame layout. Payload-bearing builders also enforce the negotiated
//! fragment size: [`PayloadFrameBuilder::build`] rejects oversized payloads,
//! [`PayloadFrameBuilder::build_fragments`] splits them into a sequence of
//! frames instead.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::frame::{
    ErrorBody, ErrorCode, Flags, Frame, FrameBody, FrameType, Keepalive, Lease, Setup,
    StreamRequest, MAJOR_VERSION, MAX_METADATA_LENGTH, MINOR_VERSION,
};
use crate::payload::Payload;
use crate::stream_id::StreamId;

/// Entry point for all frame builders
pub struct FrameBuilder;

impl FrameBuilder {
    pub fn setup() -> SetupBuilder {
        SetupBuilder::default()
    }

    pub fn lease() -> LeaseBuilder {
        LeaseBuilder::default()
    }

    pub fn keepalive() -> KeepaliveBuilder {
        KeepaliveBuilder::default()
    }

    pub fn request_response() -> PayloadFrameBuilder {
        PayloadFrameBuilder::new(FrameType::RequestResponse)
    }

    pub fn request_fnf() -> PayloadFrameBuilder {
        PayloadFrameBuilder::new(FrameType::RequestFnf)
    }

    pub fn request_stream() -> PayloadFrameBuilder {
        PayloadFrameBuilder::new(FrameType::RequestStream)
    }

    pub fn request_channel() -> PayloadFrameBuilder {
        PayloadFrameBuilder::new(FrameType::RequestChannel)
    }

    pub fn payload() -> PayloadFrameBuilder {
        PayloadFrameBuilder::new(FrameType::Payload)
    }

    pub fn request_n() -> RequestNBuilder {
        RequestNBuilder::default()
    }

    pub fn cancel() -> CancelBuilder {
        CancelBuilder::default()
    }

    pub fn error() -> ErrorBuilder {
        ErrorBuilder::default()
    }

    /// METADATA_PUSH frame on the connection stream
    pub fn metadata_push(metadata: impl Into<Bytes>) -> Frame {
        Frame::from_parts(
            StreamId::CONNECTION,
            FrameType::MetadataPush,
            Flags::METADATA,
            FrameBody::MetadataPush(metadata.into()),
        )
    }
}

fn check_mime_type(name: &str) -> Result<(), ProtocolError> {
    if !name.is_ascii() {
        return Err(ProtocolError::InvalidMimeType {
            name: name.to_string(),
            reason: "not ASCII",
        });
    }
    if name.len() > u8::MAX as usize {
        return Err(ProtocolError::InvalidMimeType {
            name: name.to_string(),
            reason: "longer than 255 bytes",
        });
    }
    Ok(())
}

fn check_metadata(metadata: &Bytes) -> Result<(), ProtocolError> {
    if metadata.len() > MAX_METADATA_LENGTH {
        return Err(ProtocolError::PayloadTooLarge {
            size: metadata.len(),
            max: MAX_METADATA_LENGTH,
        });
    }
    Ok(())
}

/// Builder for SETUP frames
#[derive(Debug, Clone)]
pub struct SetupBuilder {
    major_version: u16,
    minor_version: u16,
    keepalive_ms: u32,
    max_lifetime_ms: u32,
    resume_token: Option<Bytes>,
    honors_lease: bool,
    metadata_mime_type: String,
    data_mime_type: String,
    payload: Payload,
}

impl Default for SetupBuilder {
    fn default() -> Self {
        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            keepalive_ms: 30_000,
            max_lifetime_ms: 100_000,
            resume_token: None,
            honors_lease: false,
            metadata_mime_type: "message/x.rsocket.composite-metadata.v0".to_string(),
            data_mime_type: "application/json".to_string(),
            payload: Payload::default(),
        }
    }
}

impl SetupBuilder {
    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    pub fn keepalive_ms(mut self, ms: u32) -> Self {
        self.keepalive_ms = ms;
        self
    }

    pub fn max_lifetime_ms(mut self, ms: u32) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    pub fn resume_token(mut self, token: impl Into<Bytes>) -> Self {
        self.resume_token = Some(token.into());
        self
    }

    pub fn honors_lease(mut self, lease: bool) -> Self {
        self.honors_lease = lease;
        self
    }

    pub fn metadata_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.metadata_mime_type = mime_type.into();
        self
    }

    pub fn data_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.data_mime_type = mime_type.into();
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Result<Frame, ProtocolError> {
        check_mime_type(&self.metadata_mime_type)?;
        check_mime_type(&self.data_mime_type)?;
        check_metadata(&self.payload.metadata)?;
        if let Some(token) = &self.resume_token {
            if token.len() > u16::MAX as usize {
                return Err(ProtocolError::PayloadTooLarge {
                    size: token.len(),
                    max: u16::MAX as usize,
                });
            }
        }

        let mut flags = Flags::NONE;
        flags.set(Flags::METADATA, self.payload.has_metadata());
        flags.set(Flags::LEASE, self.honors_lease);
        flags.set(Flags::RESUME, self.resume_token.is_some());

        Ok(Frame::from_parts(
            StreamId::CONNECTION,
            FrameType::Setup,
            flags,
            FrameBody::Setup(Setup {
                major_version: self.major_version,
                minor_version: self.minor_version,
                keepalive_ms: self.keepalive_ms,
                max_lifetime_ms: self.max_lifetime_ms,
                resume_token: self.resume_token,
                metadata_mime_type: self.metadata_mime_type,
                data_mime_type: self.data_mime_type,
                payload: self.payload,
            }),
        ))
    }
}

/// Builder for LEASE frames
#[derive(Debug, Clone, Default)]
pub struct LeaseBuilder {
    ttl_ms: u32,
    number_of_requests: u32,
    metadata: Bytes,
}

impl LeaseBuilder {
    pub fn ttl_ms(mut self, ttl_ms: u32) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn number_of_requests(mut self, n: u32) -> Self {
        self.number_of_requests = n;
        self
    }

    pub fn metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn build(self) -> Frame {
        let mut flags = Flags::NONE;
        flags.set(Flags::METADATA, !self.metadata.is_empty());
        Frame::from_parts(
            StreamId::CONNECTION,
            FrameType::Lease,
            flags,
            FrameBody::Lease(Lease {
                ttl_ms: self.ttl_ms,
                number_of_requests: self.number_of_requests,
                metadata: self.metadata,
            }),
        )
    }
}

/// Builder for KEEPALIVE frames
#[derive(Debug, Clone, Default)]
pub struct KeepaliveBuilder {
    respond: bool,
    last_received_position: u64,
    data: Bytes,
}

impl KeepaliveBuilder {
    /// Ask the peer to answer this keepalive
    pub fn flag_respond(mut self) -> Self {
        self.respond = true;
        self
    }

    pub fn last_received_position(mut self, position: u64) -> Self {
        self.last_received_position = position;
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn build(self) -> Frame {
        let mut flags = Flags::NONE;
        flags.set(Flags::RESPOND, self.respond);
        Frame::from_parts(
            StreamId::CONNECTION,
            FrameType::Keepalive,
            flags,
            FrameBody::Keepalive(Keepalive {
                last_received_position: self.last_received_position,
                data: self.data,
            }),
        )
    }
}

/// Builder for REQUEST_RESPONSE, REQUEST_FNF, REQUEST_STREAM, REQUEST_CHANNEL and PAYLOAD frames
#[derive(Debug, Clone)]
pub struct PayloadFrameBuilder {
    frame_type: FrameType,
    stream_id: Option<StreamId>,
    payload: Payload,
    force_metadata: bool,
    request_n: Option<u32>,
    next: bool,
    complete: bool,
    fragment_size: usize,
}

impl PayloadFrameBuilder {
    fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            stream_id: None,
            payload: Payload::default(),
            force_metadata: false,
            request_n: None,
            next: false,
            complete: false,
            fragment_size: 0,
        }
    }

    pub fn stream_id(mut self, stream_id: impl Into<StreamId>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set the metadata flag even when the metadata is empty
    pub fn metadata_present(mut self, present: bool) -> Self {
        self.force_metadata = present;
        self
    }

    /// Initial request count (REQUEST_STREAM, REQUEST_CHANNEL)
    pub fn requests(mut self, n: u32) -> Self {
        self.request_n = Some(n);
        self
    }

    /// Mark a PAYLOAD frame as carrying a value
    pub fn flag_next(mut self) -> Self {
        self.next = true;
        self
    }

    /// Mark a PAYLOAD frame as terminating the stream
    pub fn flag_complete(mut self) -> Self {
        self.complete = true;
        self
    }

    /// Maximum payload bytes (metadata + data) per frame; 0 disables fragmentation
    pub fn fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size;
        self
    }

    fn has_metadata(&self) -> bool {
        self.force_metadata || self.payload.has_metadata()
    }

    fn validate(&self) -> Result<(StreamId, u32), ProtocolError> {
        let stream_id = self.stream_id.ok_or(ProtocolError::MissingField("stream id"))?;
        if stream_id.is_connection() {
            return Err(ProtocolError::Malformed(format!(
                "{} frame on stream 0",
                self.frame_type
            )));
        }
        let request_n = match self.frame_type {
            FrameType::RequestStream | FrameType::RequestChannel => self
                .request_n
                .ok_or(ProtocolError::MissingField("initial request count"))?,
            _ => 0,
        };
        check_metadata(&self.payload.metadata)?;
        Ok((stream_id, request_n))
    }

    fn body(&self, request_n: u32, payload: Payload) -> FrameBody {
        match self.frame_type {
            FrameType::RequestResponse => FrameBody::RequestResponse(payload),
            FrameType::RequestFnf => FrameBody::RequestFnf(payload),
            FrameType::RequestStream => FrameBody::RequestStream(StreamRequest {
                initial_request_n: request_n,
                payload,
            }),
            FrameType::RequestChannel => FrameBody::RequestChannel(StreamRequest {
                initial_request_n: request_n,
                payload,
            }),
            _ => FrameBody::Payload(payload),
        }
    }

    fn base_flags(&self) -> Flags {
        let mut flags = Flags::NONE;
        if self.frame_type == FrameType::Payload {
            flags.set(Flags::NEXT, self.next);
            flags.set(Flags::COMPLETE, self.complete);
        }
        flags
    }

    /// Build a single frame, rejecting payloads larger than the fragment size
    pub fn build(self) -> Result<Frame, ProtocolError> {
        let (stream_id, request_n) = self.validate()?;
        if self.fragment_size > 0 && self.payload.len() > self.fragment_size {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: self.fragment_size,
            });
        }

        let mut flags = self.base_flags();
        flags.set(Flags::METADATA, self.has_metadata());
        let body = self.body(request_n, self.payload.clone());
        Ok(Frame::from_parts(stream_id, self.frame_type, flags, body))
    }

    /// Build the frame, splitting it into fragments if it exceeds the fragment size.
    ///
    /// The first frame keeps the builder's frame type; continuation frames are
    /// PAYLOAD frames with NEXT set. Every frame but the last carries FOLLOWS,
    /// and COMPLETE (if requested) is only set on the last one.
    pub fn build_fragments(self) -> Result<Vec<Frame>, ProtocolError> {
        let (stream_id, request_n) = self.validate()?;
        let has_metadata = self.has_metadata();

        if self.fragment_size == 0 || self.payload.len() <= self.fragment_size {
            let mut flags = self.base_flags();
            flags.set(Flags::METADATA, has_metadata);
            let body = self.body(request_n, self.payload.clone());
            return Ok(vec![Frame::from_parts(
                stream_id,
                self.frame_type,
                flags,
                body,
            )]);
        }

        let mut metadata = self.payload.metadata.clone();
        let mut data = self.payload.data.clone();
        let mut frames = Vec::with_capacity(self.payload.len() / self.fragment_size + 1);
        let mut first = true;

        while first || !metadata.is_empty() || !data.is_empty() {
            let mut budget = self.fragment_size;
            let metadata_chunk = metadata.split_to(budget.min(metadata.len()));
            budget -= metadata_chunk.len();
            let data_chunk = data.split_to(budget.min(data.len()));
            let last = metadata.is_empty() && data.is_empty();

            let chunk_has_metadata =
                has_metadata && (!metadata_chunk.is_empty() || (first && self.payload.metadata.is_empty()));
            let chunk = Payload {
                data: data_chunk,
                metadata: metadata_chunk,
            };

            let (frame_type, mut flags, body) = if first {
                (self.frame_type, self.base_flags(), self.body(request_n, chunk))
            } else {
                (FrameType::Payload, Flags::NEXT, FrameBody::Payload(chunk))
            };
            flags.set(Flags::METADATA, chunk_has_metadata);
            flags.set(Flags::FOLLOWS, !last);
            if frame_type == FrameType::Payload {
                flags.set(Flags::COMPLETE, last && self.complete);
            }

            frames.push(Frame::from_parts(stream_id, frame_type, flags, body));
            first = false;
        }

        tracing::trace!(
            stream_id = %stream_id,
            fragments = frames.len(),
            "Fragmented {} frame",
            self.frame_type
        );
        Ok(frames)
    }
}

/// Builder for REQUEST_N frames
#[derive(Debug, Clone, Default)]
pub struct RequestNBuilder {
    stream_id: Option<StreamId>,
    requests: Option<u32>,
}

impl RequestNBuilder {
    pub fn stream_id(mut self, stream_id: impl Into<StreamId>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn requests(mut self, n: u32) -> Self {
        self.requests = Some(n);
        self
    }

    pub fn build(self) -> Result<Frame, ProtocolError> {
        let stream_id = self.stream_id.ok_or(ProtocolError::MissingField("stream id"))?;
        let requests = self.requests.ok_or(ProtocolError::MissingField("request count"))?;
        if requests == 0 {
            return Err(ProtocolError::Malformed(
                "REQUEST_N must request at least one item".to_string(),
            ));
        }
        Ok(Frame::from_parts(
            stream_id,
            FrameType::RequestN,
            Flags::NONE,
            FrameBody::RequestN(requests),
        ))
    }
}

/// Builder for CANCEL frames
#[derive(Debug, Clone, Default)]
pub struct CancelBuilder {
    stream_id: Option<StreamId>,
}

impl CancelBuilder {
    pub fn stream_id(mut self, stream_id: impl Into<StreamId>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn build(self) -> Result<Frame, ProtocolError> {
        let stream_id = self.stream_id.ok_or(ProtocolError::MissingField("stream id"))?;
        Ok(Frame::from_parts(
            stream_id,
            FrameType::Cancel,
            Flags::NONE,
            FrameBody::Cancel,
        ))
    }
}

/// Builder for ERROR frames; defaults to a connection-level error
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    stream_id: StreamId,
    code: ErrorCode,
    message: String,
}

impl Default for ErrorBuilder {
    fn default() -> Self {
        Self {
            stream_id: StreamId::CONNECTION,
            code: ErrorCode::ConnectionError,
            message: String::new(),
        }
    }
}

impl ErrorBuilder {
    pub fn stream_id(mut self, stream_id: impl Into<StreamId>) -> Self {
        self.stream_id = stream_id.into();
        self
    }

    pub fn error_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn build(self) -> Frame {
        Frame::from_parts(
            self.stream_id,
            FrameType::Error,
            Flags::NONE,
            FrameBody::Error(ErrorBody {
                code: self.code,
                message: self.message,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: &Frame) -> Frame {
        Frame::decode(frame.encode()).unwrap()
    }

    #[test]
    fn test_request_stream_requires_requests() {
        let result = FrameBuilder::request_stream()
            .stream_id(1)
            .payload(Payload::from_data("x"))
            .build();
        assert!(matches!(
            result,
            Err(ProtocolError::MissingField("initial request count"))
        ));
    }

    #[test]
    fn test_request_requires_stream_id() {
        let result = FrameBuilder::request_response()
            .payload(Payload::from_data("x"))
            .build();
        assert!(matches!(result, Err(ProtocolError::MissingField("stream id"))));
    }

    #[test]
    fn test_request_stream_roundtrip() {
        let frame = FrameBuilder::request_stream()
            .stream_id(3)
            .payload(Payload::new("data", "meta"))
            .requests(20)
            .build()
            .unwrap();

        let decoded = roundtrip(&frame);
        assert_eq!(decoded.frame_type(), FrameType::RequestStream);
        assert_eq!(decoded.stream_id(), StreamId::new(3));
        assert_eq!(decoded.request_n(), Some(20));
        assert!(decoded.has_metadata());
        assert_eq!(decoded.payload(), Some(&Payload::new("data", "meta")));
    }

    #[test]
    fn test_payload_flags_roundtrip() {
        let frame = FrameBuilder::payload()
            .stream_id(9)
            .payload(Payload::from_data("value"))
            .flag_next()
            .flag_complete()
            .build()
            .unwrap();

        let decoded = roundtrip(&frame);
        assert!(decoded.is_next());
        assert!(decoded.is_complete());
        assert!(!decoded.fragment_follows());
        assert!(!decoded.has_metadata());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_setup_roundtrip() {
        let frame = FrameBuilder::setup()
            .keepalive_ms(500)
            .max_lifetime_ms(2_000)
            .data_mime_type("text/plain")
            .payload(Payload::new("hello", vec![0xFE]))
            .build()
            .unwrap();

        let decoded = roundtrip(&frame);
        assert_eq!(decoded, frame);
        match decoded.body() {
            FrameBody::Setup(setup) => {
                assert_eq!(setup.major_version, 1);
                assert_eq!(setup.minor_version, 0);
                assert_eq!(setup.keepalive_ms, 500);
                assert_eq!(setup.data_mime_type, "text/plain");
                assert_eq!(
                    setup.metadata_mime_type,
                    "message/x.rsocket.composite-metadata.v0"
                );
            }
            other => panic!("Expected SETUP body, got {:?}", other),
        }
    }

    #[test]
    fn test_setup_with_resume_token_and_lease() {
        let frame = FrameBuilder::setup()
            .resume_token(vec![1u8, 2, 3])
            .honors_lease(true)
            .build()
            .unwrap();
        assert!(frame.flags().contains(Flags::RESUME | Flags::LEASE));
        assert_eq!(roundtrip(&frame), frame);
    }

    #[test]
    fn test_setup_rejects_non_ascii_mime() {
        let result = FrameBuilder::setup().data_mime_type("application/jsön").build();
        assert!(matches!(result, Err(ProtocolError::InvalidMimeType { .. })));
    }

    #[test]
    fn test_keepalive_roundtrip() {
        let frame = FrameBuilder::keepalive()
            .flag_respond()
            .last_received_position(1234)
            .data(vec![7u8; 20])
            .build();

        let decoded = roundtrip(&frame);
        assert!(decoded.respond_with_keepalive());
        let keepalive = decoded.keepalive().unwrap();
        assert_eq!(keepalive.last_received_position, 1234);
        assert_eq!(keepalive.data.len(), 20);
    }

    #[test]
    fn test_request_n_and_cancel_roundtrip() {
        let request_n = FrameBuilder::request_n()
            .stream_id(5)
            .requests(3)
            .build()
            .unwrap();
        assert_eq!(roundtrip(&request_n).request_n(), Some(3));

        let cancel = FrameBuilder::cancel().stream_id(5).build().unwrap();
        let decoded = roundtrip(&cancel);
        assert_eq!(decoded.frame_type(), FrameType::Cancel);
        assert_eq!(decoded.stream_id(), StreamId::new(5));
    }

    #[test]
    fn test_request_n_rejects_zero() {
        let result = FrameBuilder::request_n().stream_id(5).requests(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_error_roundtrip() {
        let frame = FrameBuilder::error()
            .stream_id(11)
            .error_code(ErrorCode::ApplicationError)
            .message("no handler for /missing")
            .build();
        let decoded = roundtrip(&frame);
        let error = decoded.error().unwrap();
        assert_eq!(error.code, ErrorCode::ApplicationError);
        assert_eq!(error.message, "no handler for /missing");
    }

    #[test]
    fn test_lease_and_metadata_push_roundtrip() {
        let lease = FrameBuilder::lease()
            .ttl_ms(1000)
            .number_of_requests(5)
            .metadata(vec![1u8])
            .build();
        assert_eq!(roundtrip(&lease), lease);

        let push = FrameBuilder::metadata_push(vec![9u8, 9]);
        assert_eq!(roundtrip(&push), push);
    }

    #[test]
    fn test_build_rejects_oversized_payload() {
        let result = FrameBuilder::request_response()
            .stream_id(1)
            .payload(Payload::from_data(vec![0u8; 100]))
            .fragment_size(64)
            .build();
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { size: 100, max: 64 })
        ));
    }

    #[test]
    fn test_small_payload_is_not_fragmented() {
        let frames = FrameBuilder::request_response()
            .stream_id(1)
            .payload(Payload::from_data(vec![0u8; 64]))
            .fragment_size(64)
            .build_fragments()
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].fragment_follows());
    }

    #[test]
    fn test_fragment_sequence_layout() {
        let payload = Payload::new(vec![1u8; 100], vec![2u8; 30]);
        let frames = FrameBuilder::request_stream()
            .stream_id(7)
            .requests(4)
            .payload(payload)
            .fragment_size(64)
            .build_fragments()
            .unwrap();

        // 130 bytes in chunks of 64: 64 + 64 + 2
        assert_eq!(frames.len(), 3);

        assert_eq!(frames[0].frame_type(), FrameType::RequestStream);
        assert_eq!(frames[0].request_n(), Some(4));
        assert!(frames[0].fragment_follows());
        assert!(frames[0].has_metadata());
        let first = frames[0].payload().unwrap();
        assert_eq!(first.metadata.len(), 30);
        assert_eq!(first.data.len(), 34);

        assert_eq!(frames[1].frame_type(), FrameType::Payload);
        assert!(frames[1].is_next());
        assert!(frames[1].fragment_follows());
        assert!(!frames[1].has_metadata());

        assert!(!frames[2].fragment_follows());
        assert_eq!(frames[2].payload().unwrap().data.len(), 2);
        assert!(frames.iter().all(|f| f.stream_id() == StreamId::new(7)));
    }

    #[test]
    fn test_complete_only_on_last_fragment() {
        let frames = FrameBuilder::payload()
            .stream_id(2)
            .payload(Payload::from_data(vec![0u8; 150]))
            .flag_next()
            .flag_complete()
            .fragment_size(64)
            .build_fragments()
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert!(frames[..2].iter().all(|f| !f.is_complete() && f.is_next()));
        assert!(frames[2].is_complete());
    }
}
