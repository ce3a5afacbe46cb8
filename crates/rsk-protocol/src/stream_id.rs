//! Stream identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mask for the 31 usable bits of a stream id (the top bit is reserved)
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// Identifier of one logical interaction on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(u32);

impl StreamId {
    /// Stream id used by connection-level frames (SETUP, KEEPALIVE, ...)
    pub const CONNECTION: StreamId = StreamId(0);

    /// Create a new stream ID, dropping the reserved top bit
    pub fn new(id: u32) -> Self {
        Self(id & STREAM_ID_MASK)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this id addresses the connection rather than a stream
    pub fn is_connection(&self) -> bool {
        self.0 == 0
    }

    /// Ids allocated by the client side of a connection are odd
    pub fn is_client_initiated(&self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_display() {
        let id = StreamId::new(42);
        assert_eq!(format!("{}", id), "stream-42");
    }

    #[test]
    fn test_reserved_bit_is_masked() {
        let id = StreamId::new(0x8000_0003);
        assert_eq!(id.as_u32(), 3);
        assert!(id.is_client_initiated());
    }

    #[test]
    fn test_connection_id() {
        assert!(StreamId::CONNECTION.is_connection());
        assert!(!StreamId::new(1).is_connection());
        assert!(!StreamId::new(2).is_client_initiated());
    }
}
