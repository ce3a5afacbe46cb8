//! Frame layout and binary encoding/decoding
//!
//! Every frame starts with a 6-byte header:
//! - stream_id: 4 bytes (1 reserved bit + 31-bit id, big-endian)
//! - type_and_flags: 2 bytes (6-bit frame type, 10-bit flags)
//!
//! The body layout depends on the frame type. Whenever the metadata flag is
//! set on a payload-bearing frame, the metadata is prefixed with a 24-bit
//! big-endian length and the data occupies the remainder of the frame.

use std::fmt;
use std::ops::BitOr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::payload::Payload;
use crate::stream_id::StreamId;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 6;

/// Request count meaning "unbounded demand"
pub const MAX_REQUEST_N: u32 = 0x7FFF_FFFF;

/// Maximum metadata length (limited by the 24-bit length field)
pub const MAX_METADATA_LENGTH: usize = 0x00FF_FFFF;

/// Protocol major version sent in SETUP
pub const MAJOR_VERSION: u16 = 1;

/// Protocol minor version sent in SETUP
pub const MINOR_VERSION: u16 = 0;

const POSITION_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Frame type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Connection setup, sent once by the client
    Setup = 0x01,
    /// Lease grant
    Lease = 0x02,
    /// Connection keepalive probe or answer
    Keepalive = 0x03,
    /// Request a single response
    RequestResponse = 0x04,
    /// Fire-and-forget request
    RequestFnf = 0x05,
    /// Request a finite or infinite stream
    RequestStream = 0x06,
    /// Bi-directional channel request
    RequestChannel = 0x07,
    /// Additional demand for a stream
    RequestN = 0x08,
    /// Cancel an outstanding request
    Cancel = 0x09,
    /// Response payload (next and/or complete)
    Payload = 0x0A,
    /// Error on a stream or on the connection
    Error = 0x0B,
    /// Connection-level metadata push
    MetadataPush = 0x0C,
    /// Resumption request
    Resume = 0x0D,
    /// Resumption acknowledgment
    ResumeOk = 0x0E,
    /// Extension frame
    Ext = 0x3F,
}

impl FrameType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Setup),
            0x02 => Some(Self::Lease),
            0x03 => Some(Self::Keepalive),
            0x04 => Some(Self::RequestResponse),
            0x05 => Some(Self::RequestFnf),
            0x06 => Some(Self::RequestStream),
            0x07 => Some(Self::RequestChannel),
            0x08 => Some(Self::RequestN),
            0x09 => Some(Self::Cancel),
            0x0A => Some(Self::Payload),
            0x0B => Some(Self::Error),
            0x0C => Some(Self::MetadataPush),
            0x0D => Some(Self::Resume),
            0x0E => Some(Self::ResumeOk),
            0x3F => Some(Self::Ext),
            _ => None,
        }
    }

    /// Frames that must travel on stream 0
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Setup
                | Self::Lease
                | Self::Keepalive
                | Self::MetadataPush
                | Self::Resume
                | Self::ResumeOk
        )
    }

    /// Frames that must travel on a non-zero stream
    pub fn requires_stream(&self) -> bool {
        matches!(
            self,
            Self::RequestResponse
                | Self::RequestFnf
                | Self::RequestStream
                | Self::RequestChannel
                | Self::RequestN
                | Self::Cancel
                | Self::Payload
        )
    }

    /// Frames that open a new interaction
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::RequestResponse | Self::RequestFnf | Self::RequestStream | Self::RequestChannel
        )
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "SETUP",
            Self::Lease => "LEASE",
            Self::Keepalive => "KEEPALIVE",
            Self::RequestResponse => "REQUEST_RESPONSE",
            Self::RequestFnf => "REQUEST_FNF",
            Self::RequestStream => "REQUEST_STREAM",
            Self::RequestChannel => "REQUEST_CHANNEL",
            Self::RequestN => "REQUEST_N",
            Self::Cancel => "CANCEL",
            Self::Payload => "PAYLOAD",
            Self::Error => "ERROR",
            Self::MetadataPush => "METADATA_PUSH",
            Self::Resume => "RESUME",
            Self::ResumeOk => "RESUME_OK",
            Self::Ext => "EXT",
        };
        f.write_str(name)
    }
}

/// The 10 flag bits of a frame header.
///
/// Several bits are shared between frame types (e.g. `FOLLOWS`, `RESPOND`
/// and `RESUME` are all bit 7); their meaning depends on the frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Flags(u16);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Frame may be ignored if not understood
    pub const IGNORE: Flags = Flags(0x200);
    /// Metadata section present
    pub const METADATA: Flags = Flags(0x100);
    /// More fragments follow (request and payload frames)
    pub const FOLLOWS: Flags = Flags(0x80);
    /// Respond with a keepalive (KEEPALIVE)
    pub const RESPOND: Flags = Flags(0x80);
    /// Resume token present (SETUP)
    pub const RESUME: Flags = Flags(0x80);
    /// Stream completed (PAYLOAD)
    pub const COMPLETE: Flags = Flags(0x40);
    /// Client will honor leases (SETUP)
    pub const LEASE: Flags = Flags(0x40);
    /// Payload carries a value (PAYLOAD)
    pub const NEXT: Flags = Flags(0x20);

    const MASK: u16 = 0x03FF;

    /// Build flags from raw header bits, ignoring the frame type bits
    pub fn from_bits(bits: u16) -> Self {
        Self(bits & Self::MASK)
    }

    /// Raw flag bits
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Whether all bits of `other` are set
    pub fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set all bits of `other`
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Clear all bits of `other`
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    /// Set or clear `other` depending on `value`
    pub fn set(&mut self, other: Flags, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Error codes carried by ERROR frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// SETUP frame is invalid
    InvalidSetup,
    /// Some SETUP parameters are not supported
    UnsupportedSetup,
    /// Server rejected the SETUP
    RejectedSetup,
    /// Server rejected the resume attempt
    RejectedResume,
    /// Connection is being terminated
    ConnectionError,
    /// Connection is being closed gracefully
    ConnectionClose,
    /// Application layer error
    ApplicationError,
    /// Request rejected by the responder
    Rejected,
    /// Responder canceled the request
    Canceled,
    /// Request is invalid
    Invalid,
    /// Any code not covered above (including extension codes)
    Other(u32),
}

impl ErrorCode {
    /// Convert to the wire value
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::InvalidSetup => 0x0000_0001,
            Self::UnsupportedSetup => 0x0000_0002,
            Self::RejectedSetup => 0x0000_0003,
            Self::RejectedResume => 0x0000_0004,
            Self::ConnectionError => 0x0000_0101,
            Self::ConnectionClose => 0x0000_0102,
            Self::ApplicationError => 0x0000_0201,
            Self::Rejected => 0x0000_0202,
            Self::Canceled => 0x0000_0203,
            Self::Invalid => 0x0000_0204,
            Self::Other(code) => *code,
        }
    }

    /// Convert from the wire value
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0000_0001 => Self::InvalidSetup,
            0x0000_0002 => Self::UnsupportedSetup,
            0x0000_0003 => Self::RejectedSetup,
            0x0000_0004 => Self::RejectedResume,
            0x0000_0101 => Self::ConnectionError,
            0x0000_0102 => Self::ConnectionClose,
            0x0000_0201 => Self::ApplicationError,
            0x0000_0202 => Self::Rejected,
            0x0000_0203 => Self::Canceled,
            0x0000_0204 => Self::Invalid,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.as_u32())
    }
}

/// SETUP frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    pub major_version: u16,
    pub minor_version: u16,
    /// Keepalive interval in milliseconds
    pub keepalive_ms: u32,
    /// Max lifetime in milliseconds
    pub max_lifetime_ms: u32,
    pub resume_token: Option<Bytes>,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    pub payload: Payload,
}

/// LEASE frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ttl_ms: u32,
    pub number_of_requests: u32,
    pub metadata: Bytes,
}

/// KEEPALIVE frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keepalive {
    /// Number of bytes received by the sender so far (63 bits)
    pub last_received_position: u64,
    /// Opaque data echoed back by the peer
    pub data: Bytes,
}

/// REQUEST_STREAM and REQUEST_CHANNEL frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub initial_request_n: u32,
    pub payload: Payload,
}

/// ERROR frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Type-specific part of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Setup(Setup),
    Lease(Lease),
    Keepalive(Keepalive),
    RequestResponse(Payload),
    RequestFnf(Payload),
    RequestStream(StreamRequest),
    RequestChannel(StreamRequest),
    RequestN(u32),
    Cancel,
    Payload(Payload),
    Error(ErrorBody),
    MetadataPush(Bytes),
    /// Body of frames that are carried but not interpreted (RESUME, RESUME_OK, EXT)
    Opaque(Bytes),
}

/// A protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    stream_id: StreamId,
    frame_type: FrameType,
    flags: Flags,
    body: FrameBody,
}

impl Frame {
    /// Assemble a frame from already validated parts
    pub(crate) fn from_parts(
        stream_id: StreamId,
        frame_type: FrameType,
        flags: Flags,
        body: FrameBody,
    ) -> Self {
        Self {
            stream_id,
            frame_type,
            flags,
            body,
        }
    }

    /// Stream this frame belongs to
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Type of this frame
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Header flags
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Type-specific body
    pub fn body(&self) -> &FrameBody {
        &self.body
    }

    /// Consume the frame, returning its body
    pub fn into_body(self) -> FrameBody {
        self.body
    }

    pub fn has_metadata(&self) -> bool {
        self.flags.contains(Flags::METADATA)
    }

    pub fn ignore(&self) -> bool {
        self.flags.contains(Flags::IGNORE)
    }

    /// PAYLOAD carries a value
    pub fn is_next(&self) -> bool {
        self.frame_type == FrameType::Payload && self.flags.contains(Flags::NEXT)
    }

    /// PAYLOAD terminates the stream
    pub fn is_complete(&self) -> bool {
        self.frame_type == FrameType::Payload && self.flags.contains(Flags::COMPLETE)
    }

    /// More fragments of this payload follow
    pub fn fragment_follows(&self) -> bool {
        (self.frame_type.is_request() || self.frame_type == FrameType::Payload)
            && self.flags.contains(Flags::FOLLOWS)
    }

    /// KEEPALIVE asks the peer to answer
    pub fn respond_with_keepalive(&self) -> bool {
        self.frame_type == FrameType::Keepalive && self.flags.contains(Flags::RESPOND)
    }

    /// Payload of request and payload frames (and of SETUP)
    pub fn payload(&self) -> Option<&Payload> {
        match &self.body {
            FrameBody::RequestResponse(p) | FrameBody::RequestFnf(p) | FrameBody::Payload(p) => {
                Some(p)
            }
            FrameBody::RequestStream(r) | FrameBody::RequestChannel(r) => Some(&r.payload),
            FrameBody::Setup(s) => Some(&s.payload),
            _ => None,
        }
    }

    /// Consume the frame, returning its payload if it carries one
    pub fn into_payload(self) -> Option<Payload> {
        match self.body {
            FrameBody::RequestResponse(p) | FrameBody::RequestFnf(p) | FrameBody::Payload(p) => {
                Some(p)
            }
            FrameBody::RequestStream(r) | FrameBody::RequestChannel(r) => Some(r.payload),
            FrameBody::Setup(s) => Some(s.payload),
            _ => None,
        }
    }

    /// Initial request count of REQUEST_STREAM/REQUEST_CHANNEL or the count of REQUEST_N
    pub fn request_n(&self) -> Option<u32> {
        match &self.body {
            FrameBody::RequestStream(r) | FrameBody::RequestChannel(r) => {
                Some(r.initial_request_n)
            }
            FrameBody::RequestN(n) => Some(*n),
            _ => None,
        }
    }

    /// Error body of ERROR frames
    pub fn error(&self) -> Option<&ErrorBody> {
        match &self.body {
            FrameBody::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Keepalive body of KEEPALIVE frames
    pub fn keepalive(&self) -> Option<&Keepalive> {
        match &self.body {
            FrameBody::Keepalive(k) => Some(k),
            _ => None,
        }
    }

    /// Encode the frame into a new buffer
    pub fn encode(&self) -> Bytes {
        let hint = HEADER_SIZE + 16 + self.payload().map(|p| p.len() + 3).unwrap_or(0);
        let mut buf = BytesMut::with_capacity(hint);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode the frame, appending to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u32(self.stream_id.as_u32());
        dst.put_u16(((self.frame_type.as_u8() as u16) << 10) | self.flags.bits());

        let has_metadata = self.has_metadata();
        match &self.body {
            FrameBody::Setup(setup) => {
                dst.put_u16(setup.major_version);
                dst.put_u16(setup.minor_version);
                dst.put_u32(setup.keepalive_ms);
                dst.put_u32(setup.max_lifetime_ms);
                if let Some(token) = &setup.resume_token {
                    dst.put_u16(token.len() as u16);
                    dst.put_slice(token);
                }
                dst.put_u8(setup.metadata_mime_type.len() as u8);
                dst.put_slice(setup.metadata_mime_type.as_bytes());
                dst.put_u8(setup.data_mime_type.len() as u8);
                dst.put_slice(setup.data_mime_type.as_bytes());
                put_payload(dst, &setup.payload, has_metadata);
            }
            FrameBody::Lease(lease) => {
                dst.put_u32(lease.ttl_ms);
                dst.put_u32(lease.number_of_requests);
                dst.put_slice(&lease.metadata);
            }
            FrameBody::Keepalive(keepalive) => {
                dst.put_u64(keepalive.last_received_position & POSITION_MASK);
                dst.put_slice(&keepalive.data);
            }
            FrameBody::RequestResponse(payload)
            | FrameBody::RequestFnf(payload)
            | FrameBody::Payload(payload) => put_payload(dst, payload, has_metadata),
            FrameBody::RequestStream(request) | FrameBody::RequestChannel(request) => {
                dst.put_u32(request.initial_request_n);
                put_payload(dst, &request.payload, has_metadata);
            }
            FrameBody::RequestN(n) => dst.put_u32(*n),
            FrameBody::Cancel => {}
            FrameBody::Error(error) => {
                dst.put_u32(error.code.as_u32());
                dst.put_slice(error.message.as_bytes());
            }
            FrameBody::MetadataPush(metadata) => dst.put_slice(metadata),
            FrameBody::Opaque(bytes) => dst.put_slice(bytes),
        }
    }

    /// Decode a single complete frame
    pub fn decode(mut src: Bytes) -> Result<Frame, ProtocolError> {
        ensure(&src, HEADER_SIZE, "frame header")?;

        let stream_id = StreamId::new(src.get_u32());
        let type_and_flags = src.get_u16();
        let type_byte = (type_and_flags >> 10) as u8;
        let frame_type =
            FrameType::from_u8(type_byte).ok_or(ProtocolError::UnknownFrameType(type_byte))?;
        let flags = Flags::from_bits(type_and_flags);

        if frame_type.is_connection_level() && !stream_id.is_connection() {
            return Err(ProtocolError::Malformed(format!(
                "{} frame on non-zero {}",
                frame_type, stream_id
            )));
        }
        if frame_type.requires_stream() && stream_id.is_connection() {
            return Err(ProtocolError::Malformed(format!(
                "{} frame on stream 0",
                frame_type
            )));
        }

        let body = match frame_type {
            FrameType::Setup => FrameBody::Setup(decode_setup(&mut src, flags)?),
            FrameType::Lease => {
                ensure(&src, 8, "LEASE body")?;
                let ttl_ms = src.get_u32();
                let number_of_requests = src.get_u32();
                FrameBody::Lease(Lease {
                    ttl_ms,
                    number_of_requests,
                    metadata: src,
                })
            }
            FrameType::Keepalive => {
                ensure(&src, 8, "KEEPALIVE body")?;
                let last_received_position = src.get_u64() & POSITION_MASK;
                FrameBody::Keepalive(Keepalive {
                    last_received_position,
                    data: src,
                })
            }
            FrameType::RequestResponse => {
                FrameBody::RequestResponse(take_payload(&mut src, flags)?)
            }
            FrameType::RequestFnf => FrameBody::RequestFnf(take_payload(&mut src, flags)?),
            FrameType::RequestStream | FrameType::RequestChannel => {
                ensure(&src, 4, "initial request n")?;
                let initial_request_n = src.get_u32();
                let request = StreamRequest {
                    initial_request_n,
                    payload: take_payload(&mut src, flags)?,
                };
                if frame_type == FrameType::RequestStream {
                    FrameBody::RequestStream(request)
                } else {
                    FrameBody::RequestChannel(request)
                }
            }
            FrameType::RequestN => {
                ensure(&src, 4, "REQUEST_N body")?;
                FrameBody::RequestN(src.get_u32())
            }
            FrameType::Cancel => FrameBody::Cancel,
            FrameType::Payload => FrameBody::Payload(take_payload(&mut src, flags)?),
            FrameType::Error => {
                ensure(&src, 4, "error code")?;
                let code = ErrorCode::from_u32(src.get_u32());
                let message = String::from_utf8_lossy(&src).into_owned();
                FrameBody::Error(ErrorBody { code, message })
            }
            FrameType::MetadataPush => FrameBody::MetadataPush(src),
            FrameType::Resume | FrameType::ResumeOk | FrameType::Ext => FrameBody::Opaque(src),
        };

        Ok(Frame {
            stream_id,
            frame_type,
            flags,
            body,
        })
    }

    /// Read the stream id from a frame header without decoding the body
    pub fn peek_stream_id(src: &[u8]) -> Option<StreamId> {
        if src.len() < 4 {
            return None;
        }
        let raw = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        Some(StreamId::new(raw))
    }

    /// Read the flag bits from a frame header without decoding the body
    pub fn peek_flags(src: &[u8]) -> Option<Flags> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        Some(Flags::from_bits(u16::from_be_bytes([src[4], src[5]])))
    }
}

fn ensure(src: &Bytes, needed: usize, what: &str) -> Result<(), ProtocolError> {
    if src.remaining() < needed {
        return Err(ProtocolError::truncated(what, needed, src.remaining()));
    }
    Ok(())
}

pub(crate) fn put_u24(dst: &mut BytesMut, value: usize) {
    dst.put_u8((value >> 16) as u8);
    dst.put_u16(value as u16);
}

pub(crate) fn get_u24(src: &mut Bytes) -> usize {
    let high = src.get_u8() as usize;
    let low = src.get_u16() as usize;
    (high << 16) | low
}

fn put_payload(dst: &mut BytesMut, payload: &Payload, has_metadata: bool) {
    if has_metadata {
        put_u24(dst, payload.metadata.len());
        dst.put_slice(&payload.metadata);
    }
    dst.put_slice(&payload.data);
}

fn take_payload(src: &mut Bytes, flags: Flags) -> Result<Payload, ProtocolError> {
    let metadata = if flags.contains(Flags::METADATA) {
        ensure(src, 3, "metadata length")?;
        let len = get_u24(src);
        ensure(src, len, "metadata")?;
        src.split_to(len)
    } else {
        Bytes::new()
    };
    let data = std::mem::take(src);
    Ok(Payload { data, metadata })
}

fn take_mime_type(src: &mut Bytes, what: &str) -> Result<String, ProtocolError> {
    ensure(src, 1, what)?;
    let len = src.get_u8() as usize;
    ensure(src, len, what)?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| ProtocolError::Malformed(format!("{} is not valid ASCII", what)))
}

fn decode_setup(src: &mut Bytes, flags: Flags) -> Result<Setup, ProtocolError> {
    ensure(src, 12, "SETUP body")?;
    let major_version = src.get_u16();
    let minor_version = src.get_u16();
    let keepalive_ms = src.get_u32();
    let max_lifetime_ms = src.get_u32();

    let resume_token = if flags.contains(Flags::RESUME) {
        ensure(src, 2, "resume token length")?;
        let len = src.get_u16() as usize;
        ensure(src, len, "resume token")?;
        Some(src.split_to(len))
    } else {
        None
    };

    let metadata_mime_type = take_mime_type(src, "metadata mime type")?;
    let data_mime_type = take_mime_type(src, "data mime type")?;
    let payload = take_payload(src, flags)?;

    Ok(Setup {
        major_version,
        minor_version,
        keepalive_ms,
        max_lifetime_ms,
        resume_token,
        metadata_mime_type,
        data_mime_type,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_roundtrip() {
        for frame_type in [
            FrameType::Setup,
            FrameType::Lease,
            FrameType::Keepalive,
            FrameType::RequestResponse,
            FrameType::RequestFnf,
            FrameType::RequestStream,
            FrameType::RequestChannel,
            FrameType::RequestN,
            FrameType::Cancel,
            FrameType::Payload,
            FrameType::Error,
            FrameType::MetadataPush,
            FrameType::Resume,
            FrameType::ResumeOk,
            FrameType::Ext,
        ] {
            let byte = frame_type.as_u8();
            assert_eq!(FrameType::from_u8(byte), Some(frame_type));
        }
        assert_eq!(FrameType::from_u8(0x00), None);
    }

    #[test]
    fn test_header_layout() {
        let frame = Frame::from_parts(
            StreamId::new(5),
            FrameType::Payload,
            Flags::NEXT | Flags::COMPLETE,
            FrameBody::Payload(Payload::from_data("hi")),
        );
        let bytes = frame.encode();

        assert_eq!(&bytes[..4], &[0, 0, 0, 5]);
        // type 0x0A << 10 | NEXT | COMPLETE
        assert_eq!(&bytes[4..6], &[0x28, 0x60]);
        assert_eq!(&bytes[6..], b"hi");
    }

    #[test]
    fn test_metadata_length_prefix() {
        let frame = Frame::from_parts(
            StreamId::new(1),
            FrameType::RequestResponse,
            Flags::METADATA,
            FrameBody::RequestResponse(Payload::new("data", "meta")),
        );
        let bytes = frame.encode();
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 3], &[0, 0, 4]);
        assert_eq!(&bytes[HEADER_SIZE + 3..HEADER_SIZE + 7], b"meta");

        let decoded = Frame::decode(bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_empty_metadata_is_distinguishable() {
        let with_empty = Frame::from_parts(
            StreamId::new(1),
            FrameType::Payload,
            Flags::METADATA | Flags::NEXT,
            FrameBody::Payload(Payload::from_data("x")),
        );
        let without = Frame::from_parts(
            StreamId::new(1),
            FrameType::Payload,
            Flags::NEXT,
            FrameBody::Payload(Payload::from_data("x")),
        );

        let decoded_with = Frame::decode(with_empty.encode()).unwrap();
        let decoded_without = Frame::decode(without.encode()).unwrap();

        assert!(decoded_with.has_metadata());
        assert!(!decoded_without.has_metadata());
        assert_eq!(decoded_with.payload(), decoded_without.payload());
    }

    #[test]
    fn test_truncated_header() {
        let result = Frame::decode(Bytes::from_static(&[0, 0, 0]));
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_truncated_metadata() {
        // PAYLOAD with metadata flag, declared length 16 but only 2 bytes present
        let bytes = Bytes::from_static(&[0, 0, 0, 1, 0x29, 0x20, 0, 0, 16, 1, 2]);
        let result = Frame::decode(bytes);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_unknown_frame_type() {
        // type 0x20 << 10
        let bytes = Bytes::from_static(&[0, 0, 0, 1, 0x80, 0x00]);
        let result = Frame::decode(bytes);
        assert!(matches!(result, Err(ProtocolError::UnknownFrameType(0x20))));
    }

    #[test]
    fn test_stream_id_rules() {
        // KEEPALIVE on stream 3
        let mut keepalive = vec![0, 0, 0, 3, 0x0C, 0x80];
        keepalive.extend_from_slice(&[0; 8]);
        assert!(matches!(
            Frame::decode(Bytes::from(keepalive)),
            Err(ProtocolError::Malformed(_))
        ));

        // CANCEL on stream 0
        let cancel = Bytes::from_static(&[0, 0, 0, 0, 0x24, 0x00]);
        assert!(matches!(
            Frame::decode(cancel),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_frame_decoding() {
        let mut raw = vec![0, 0, 0, 7, 0x2C, 0x00, 0, 0, 0x02, 0x01];
        raw.extend_from_slice(b"boom");
        let frame = Frame::decode(Bytes::from(raw)).unwrap();

        let error = frame.error().unwrap();
        assert_eq!(error.code, ErrorCode::ApplicationError);
        assert_eq!(error.message, "boom");
        assert_eq!(frame.stream_id(), StreamId::new(7));
    }

    #[test]
    fn test_error_code_roundtrip() {
        for code in [
            ErrorCode::InvalidSetup,
            ErrorCode::UnsupportedSetup,
            ErrorCode::RejectedSetup,
            ErrorCode::RejectedResume,
            ErrorCode::ConnectionError,
            ErrorCode::ConnectionClose,
            ErrorCode::ApplicationError,
            ErrorCode::Rejected,
            ErrorCode::Canceled,
            ErrorCode::Invalid,
            ErrorCode::Other(0x301),
        ] {
            assert_eq!(ErrorCode::from_u32(code.as_u32()), code);
        }
    }

    #[test]
    fn test_peek_stream_id() {
        assert_eq!(
            Frame::peek_stream_id(&[0x80, 0, 0, 9, 0xFF]),
            Some(StreamId::new(9))
        );
        assert_eq!(Frame::peek_stream_id(&[0, 0]), None);
    }

    #[test]
    fn test_peek_flags_of_unknown_frame_type() {
        // Type 0x30 with IGNORE set
        let raw = [0, 0, 0, 1, 0xC2, 0x00, 0xAA];
        assert!(matches!(
            Frame::decode(Bytes::copy_from_slice(&raw)),
            Err(ProtocolError::UnknownFrameType(0x30))
        ));
        let flags = Frame::peek_flags(&raw).unwrap();
        assert!(flags.contains(Flags::IGNORE));
        assert!(!flags.contains(Flags::METADATA));
        assert_eq!(Frame::peek_flags(&raw[..5]), None);
    }

    #[test]
    fn test_flags_set_and_remove() {
        let mut flags = Flags::NONE;
        flags.set(Flags::FOLLOWS, true);
        flags.insert(Flags::METADATA);
        assert!(flags.contains(Flags::FOLLOWS | Flags::METADATA));
        flags.remove(Flags::FOLLOWS);
        assert!(!flags.contains(Flags::FOLLOWS));
        assert_eq!(Flags::from_bits(0xFFFF).bits(), 0x03FF);
    }
}
