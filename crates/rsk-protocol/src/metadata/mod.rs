//! Composite metadata
//!
//! Composite metadata is a self-describing concatenation of entries:
//!
//! ```text
//! +------------------------+------------------+-------------+
//! | 0x80|id  or  len+ASCII | data length (24) | data bytes  |
//! +------------------------+------------------+-------------+
//! ```
//!
//! Routing, authentication and mime-type entries have their own sub-codecs.

mod auth;
mod mime_type;
mod routing;

pub use auth::Authentication;
pub use mime_type::{decode_mime_types, encode_mime_types};
pub use routing::RoutingMetadata;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::frame::{get_u24, put_u24, MAX_METADATA_LENGTH};
use crate::mime::{MimeRegistry, MESSAGE_RSOCKET_AUTHENTICATION, MESSAGE_RSOCKET_ROUTING};

const WELL_KNOWN_FLAG: u8 = 0x80;
const MAX_MIME_NAME_LENGTH: usize = 0x7F;

/// One `(mime type, data)` entry of composite metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub mime_type: String,
    pub data: Bytes,
}

impl MetadataEntry {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// Ordered sequence of metadata entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeMetadata {
    entries: Vec<MetadataEntry>,
}

impl CompositeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mime_type: impl Into<String>, data: impl Into<Bytes>) {
        self.entries.push(MetadataEntry::new(mime_type, data));
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry with the given mime type
    pub fn get_by_mime_type(&self, mime_type: &str) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.mime_type == mime_type)
    }

    /// Remove and return the first entry with the given mime type
    pub fn remove_by_mime_type(&mut self, mime_type: &str) -> Option<MetadataEntry> {
        let index = self.entries.iter().position(|e| e.mime_type == mime_type)?;
        Some(self.entries.remove(index))
    }

    /// Route of the first routing entry, if any
    pub fn route(&self) -> Result<Option<String>, ProtocolError> {
        match self.get_by_mime_type(MESSAGE_RSOCKET_ROUTING.name) {
            Some(entry) => {
                let routing = RoutingMetadata::decode(entry.data.clone())?;
                Ok(routing.route().map(str::to_string))
            }
            None => Ok(None),
        }
    }

    /// Append a routing entry carrying a single route tag
    pub fn push_route(&mut self, route: &str) -> Result<(), ProtocolError> {
        let data = RoutingMetadata::from_route(route).encode()?;
        self.push(MESSAGE_RSOCKET_ROUTING.name, data);
        Ok(())
    }

    /// Credentials of the first authentication entry, if any
    pub fn authentication(&self) -> Result<Option<Authentication>, ProtocolError> {
        match self.get_by_mime_type(MESSAGE_RSOCKET_AUTHENTICATION.name) {
            Some(entry) => Authentication::decode(entry.data.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Append an authentication entry
    pub fn push_authentication(&mut self, auth: &Authentication) -> Result<(), ProtocolError> {
        let data = auth.encode()?;
        self.push(MESSAGE_RSOCKET_AUTHENTICATION.name, data);
        Ok(())
    }

    /// Encode all entries, using single-byte ids for mime types in `registry`
    pub fn encode(&self, registry: &MimeRegistry) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        for entry in &self.entries {
            if entry.data.len() > MAX_METADATA_LENGTH {
                return Err(ProtocolError::PayloadTooLarge {
                    size: entry.data.len(),
                    max: MAX_METADATA_LENGTH,
                });
            }
            put_mime_type(&mut buf, &entry.mime_type, registry)?;
            put_u24(&mut buf, entry.data.len());
            buf.put_slice(&entry.data);
        }
        Ok(buf.freeze())
    }

    /// Decode entries in order
    pub fn decode(mut src: Bytes, registry: &MimeRegistry) -> Result<Self, ProtocolError> {
        let mut metadata = Self::new();
        while src.has_remaining() {
            let mime_type = take_mime_type(&mut src, registry)?;
            if src.remaining() < 3 {
                return Err(ProtocolError::truncated(
                    "metadata entry length",
                    3,
                    src.remaining(),
                ));
            }
            let len = get_u24(&mut src);
            if src.remaining() < len {
                return Err(ProtocolError::truncated(
                    "metadata entry data",
                    len,
                    src.remaining(),
                ));
            }
            let data = src.split_to(len);
            metadata.entries.push(MetadataEntry { mime_type, data });
        }
        Ok(metadata)
    }
}

impl<'a> IntoIterator for &'a CompositeMetadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<MetadataEntry> for CompositeMetadata {
    fn from_iter<I: IntoIterator<Item = MetadataEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Write a mime type as `0x80|id` when well-known, else as length + ASCII name
pub(crate) fn put_mime_type(
    buf: &mut BytesMut,
    name: &str,
    registry: &MimeRegistry,
) -> Result<(), ProtocolError> {
    if let Some(well_known) = registry.by_name(name) {
        buf.put_u8(WELL_KNOWN_FLAG | well_known.identifier);
        return Ok(());
    }
    if name.is_empty() || name.len() > MAX_MIME_NAME_LENGTH {
        return Err(ProtocolError::InvalidMimeType {
            name: name.to_string(),
            reason: "length must be 1..=127",
        });
    }
    if !name.is_ascii() {
        return Err(ProtocolError::InvalidMimeType {
            name: name.to_string(),
            reason: "not ASCII",
        });
    }
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
    Ok(())
}

/// Read a mime type written by [`put_mime_type`]
pub(crate) fn take_mime_type(
    src: &mut Bytes,
    registry: &MimeRegistry,
) -> Result<String, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::truncated("mime type", 1, 0));
    }
    let id_or_length = src.get_u8();
    if id_or_length & WELL_KNOWN_FLAG != 0 {
        let identifier = id_or_length & 0x7F;
        return registry
            .by_identifier(identifier)
            .map(|m| m.name.to_string())
            .ok_or(ProtocolError::UnknownMimeType(identifier));
    }

    let len = id_or_length as usize;
    if len == 0 {
        return Err(ProtocolError::Malformed("empty mime type name".to_string()));
    }
    if src.remaining() < len {
        return Err(ProtocolError::truncated("mime type name", len, src.remaining()));
    }
    let raw = src.split_to(len);
    if !raw.is_ascii() {
        return Err(ProtocolError::Malformed(
            "mime type name is not ASCII".to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
