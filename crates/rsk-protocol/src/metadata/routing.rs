//! Routing metadata: a sequence of `u8` length-prefixed UTF-8 tags

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

const MAX_TAG_LENGTH: usize = u8::MAX as usize;

/// Route tags carried in a routing metadata entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingMetadata {
    tags: Vec<String>,
}

impl RoutingMetadata {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_route(route: impl Into<String>) -> Self {
        Self {
            tags: vec![route.into()],
        }
    }

    /// The first tag, which is the route by convention
    pub fn route(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.tags.iter().map(|t| t.len() + 1).sum());
        for tag in &self.tags {
            if tag.len() > MAX_TAG_LENGTH {
                return Err(ProtocolError::Unencodable(format!(
                    "route tag of {} bytes exceeds {}",
                    tag.len(),
                    MAX_TAG_LENGTH
                )));
            }
            buf.put_u8(tag.len() as u8);
            buf.put_slice(tag.as_bytes());
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        let mut tags = Vec::new();
        while src.has_remaining() {
            let len = src.get_u8() as usize;
            if src.remaining() < len {
                return Err(ProtocolError::truncated("route tag", len, src.remaining()));
            }
            let raw = src.split_to(len);
            let tag = std::str::from_utf8(&raw)
                .map_err(|e| ProtocolError::Malformed(format!("route tag is not UTF-8: {}", e)))?;
            tags.push(tag.to_string());
        }
        Ok(Self { tags })
    }
}
