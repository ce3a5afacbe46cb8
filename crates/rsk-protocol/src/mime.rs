//! Well-known mime types
//!
//! Well-known mime types are encoded on the wire as a single byte
//! (`0x80 | identifier`) instead of their full name. The table of standard
//! types is a `const`; a [`MimeRegistry`] is built from it explicitly and
//! passed to the codecs that need it.

use std::collections::HashMap;

use crate::error::ProtocolError;

/// A mime type with a single-byte wire identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WellKnownMimeType {
    pub name: &'static str,
    pub identifier: u8,
}

impl WellKnownMimeType {
    pub const fn new(name: &'static str, identifier: u8) -> Self {
        Self { name, identifier }
    }
}

pub const APPLICATION_JSON: WellKnownMimeType = WellKnownMimeType::new("application/json", 0x05);
pub const APPLICATION_OCTET_STREAM: WellKnownMimeType =
    WellKnownMimeType::new("application/octet-stream", 0x06);
pub const APPLICATION_PROTOBUF: WellKnownMimeType =
    WellKnownMimeType::new("application/vnd.google.protobuf", 0x09);
pub const TEXT_PLAIN: WellKnownMimeType = WellKnownMimeType::new("text/plain", 0x21);
pub const MESSAGE_RSOCKET_MIME_TYPE: WellKnownMimeType =
    WellKnownMimeType::new("message/x.rsocket.mime-type.v0", 0x7A);
pub const MESSAGE_RSOCKET_ACCEPT_MIME_TYPES: WellKnownMimeType =
    WellKnownMimeType::new("message/x.rsocket.accept-mime-types.v0", 0x7B);
pub const MESSAGE_RSOCKET_AUTHENTICATION: WellKnownMimeType =
    WellKnownMimeType::new("message/x.rsocket.authentication.v0", 0x7C);
pub const MESSAGE_RSOCKET_TRACING_ZIPKIN: WellKnownMimeType =
    WellKnownMimeType::new("message/x.rsocket.tracing-zipkin.v0", 0x7D);
pub const MESSAGE_RSOCKET_ROUTING: WellKnownMimeType =
    WellKnownMimeType::new("message/x.rsocket.routing.v0", 0x7E);
pub const MESSAGE_RSOCKET_COMPOSITE_METADATA: WellKnownMimeType =
    WellKnownMimeType::new("message/x.rsocket.composite-metadata.v0", 0x7F);

/// Standard RSocket well-known mime types
pub const WELL_KNOWN_MIME_TYPES: &[WellKnownMimeType] = &[
    WellKnownMimeType::new("application/avro", 0x00),
    WellKnownMimeType::new("application/cbor", 0x01),
    WellKnownMimeType::new("application/graphql", 0x02),
    WellKnownMimeType::new("application/gzip", 0x03),
    WellKnownMimeType::new("application/javascript", 0x04),
    APPLICATION_JSON,
    APPLICATION_OCTET_STREAM,
    WellKnownMimeType::new("application/pdf", 0x07),
    WellKnownMimeType::new("application/vnd.apache.thrift.binary", 0x08),
    APPLICATION_PROTOBUF,
    WellKnownMimeType::new("application/xml", 0x0A),
    WellKnownMimeType::new("application/zip", 0x0B),
    WellKnownMimeType::new("audio/aac", 0x0C),
    WellKnownMimeType::new("audio/mp3", 0x0D),
    WellKnownMimeType::new("audio/mp4", 0x0E),
    WellKnownMimeType::new("audio/mpeg3", 0x0F),
    WellKnownMimeType::new("audio/mpeg", 0x10),
    WellKnownMimeType::new("audio/ogg", 0x11),
    WellKnownMimeType::new("audio/opus", 0x12),
    WellKnownMimeType::new("audio/vorbis", 0x13),
    WellKnownMimeType::new("image/bmp", 0x14),
    WellKnownMimeType::new("image/gif", 0x15),
    WellKnownMimeType::new("image/heic-sequence", 0x16),
    WellKnownMimeType::new("image/heic", 0x17),
    WellKnownMimeType::new("image/heif-sequence", 0x18),
    WellKnownMimeType::new("image/heif", 0x19),
    WellKnownMimeType::new("image/jpeg", 0x1A),
    WellKnownMimeType::new("image/png", 0x1B),
    WellKnownMimeType::new("image/tiff", 0x1C),
    WellKnownMimeType::new("multipart/mixed", 0x1D),
    WellKnownMimeType::new("text/css", 0x1E),
    WellKnownMimeType::new("text/csv", 0x1F),
    WellKnownMimeType::new("text/html", 0x20),
    TEXT_PLAIN,
    WellKnownMimeType::new("text/xml", 0x22),
    WellKnownMimeType::new("video/H264", 0x23),
    WellKnownMimeType::new("video/H265", 0x24),
    WellKnownMimeType::new("video/VP8", 0x25),
    WellKnownMimeType::new("application/x-hessian", 0x26),
    WellKnownMimeType::new("application/x-java-object", 0x27),
    WellKnownMimeType::new("application/cloudevents+json", 0x28),
    WellKnownMimeType::new("application/x-capnp", 0x29),
    WellKnownMimeType::new("application/x-flatbuffers", 0x2A),
    MESSAGE_RSOCKET_MIME_TYPE,
    MESSAGE_RSOCKET_ACCEPT_MIME_TYPES,
    MESSAGE_RSOCKET_AUTHENTICATION,
    MESSAGE_RSOCKET_TRACING_ZIPKIN,
    MESSAGE_RSOCKET_ROUTING,
    MESSAGE_RSOCKET_COMPOSITE_METADATA,
];

/// Bidirectional lookup between well-known mime names and identifiers
#[derive(Debug, Clone, Default)]
pub struct MimeRegistry {
    by_identifier: HashMap<u8, WellKnownMimeType>,
    by_name: HashMap<&'static str, WellKnownMimeType>,
}

impl MimeRegistry {
    /// Registry without any entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding [`WELL_KNOWN_MIME_TYPES`]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for mime_type in WELL_KNOWN_MIME_TYPES {
            registry.by_identifier.insert(mime_type.identifier, *mime_type);
            registry.by_name.insert(mime_type.name, *mime_type);
        }
        registry
    }

    /// Add an entry; identifiers must be 0..=127 and both keys unique
    pub fn register(&mut self, mime_type: WellKnownMimeType) -> Result<(), ProtocolError> {
        if mime_type.identifier > 0x7F {
            return Err(ProtocolError::InvalidMimeType {
                name: mime_type.name.to_string(),
                reason: "identifier must be in 0..=127",
            });
        }
        if self.by_identifier.contains_key(&mime_type.identifier)
            || self.by_name.contains_key(mime_type.name)
        {
            return Err(ProtocolError::DuplicateMimeType(mime_type.name.to_string()));
        }
        self.by_identifier.insert(mime_type.identifier, mime_type);
        self.by_name.insert(mime_type.name, mime_type);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, mime_type: WellKnownMimeType) -> Result<Self, ProtocolError> {
        self.register(mime_type)?;
        Ok(self)
    }

    pub fn by_identifier(&self, identifier: u8) -> Option<&WellKnownMimeType> {
        self.by_identifier.get(&identifier)
    }

    pub fn by_name(&self, name: &str) -> Option<&WellKnownMimeType> {
        self.by_name.get(name)
    }

    pub fn is_well_known(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_identifier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }
}
