//! rsk-protocol: RSocket wire protocol
//!
//! This crate defines the binary frame format, frame builders, payload
//! fragmentation and reassembly, and the composite metadata extensions
//! (routing, authentication, mime types). It does no I/O.

pub mod builder;
pub mod codec;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod metadata;
pub mod mime;
pub mod payload;
pub mod stream_id;

pub use builder::FrameBuilder;
pub use codec::FrameLengthCodec;
pub use error::ProtocolError;
pub use fragment::{FragmentContext, FragmentState};
pub use frame::{
    ErrorBody, ErrorCode, Flags, Frame, FrameBody, FrameType, Keepalive, Lease, Setup,
    StreamRequest, HEADER_SIZE, MAX_REQUEST_N,
};
pub use metadata::{Authentication, CompositeMetadata, MetadataEntry, RoutingMetadata};
pub use mime::{MimeRegistry, WellKnownMimeType};
pub use payload::Payload;
pub use stream_id::StreamId;
