//! Request and response payloads

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Data and metadata carried by request and payload frames.
///
/// Absent metadata is an empty buffer. Whether metadata was actually present
/// on the wire is carried by the owning frame's metadata flag, see
/// [`Frame::has_metadata`](crate::Frame::has_metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Application data
    pub data: Bytes,
    /// Metadata section (possibly composite metadata)
    pub metadata: Bytes,
}

impl Payload {
    /// Create a payload with data and metadata
    pub fn new(data: impl Into<Bytes>, metadata: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: metadata.into(),
        }
    }

    /// Create a payload carrying only data
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: Bytes::new(),
        }
    }

    /// Whether the metadata buffer holds any bytes
    pub fn has_metadata(&self) -> bool {
        !self.metadata.is_empty()
    }

    /// Total number of payload bytes (metadata + data)
    pub fn len(&self) -> usize {
        self.data.len() + self.metadata.len()
    }

    /// Whether both data and metadata are empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.metadata.is_empty()
    }

    /// Data interpreted as UTF-8, replacing invalid sequences
    pub fn data_utf8(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
