//! Per-stream data mime type and accepted mime types entries
//!
//! Both entries are a sequence of mime descriptors in the same format
//! composite metadata uses for entry types.

use bytes::{Buf, Bytes, BytesMut};

use super::{put_mime_type, take_mime_type};
use crate::error::ProtocolError;
use crate::mime::MimeRegistry;

pub fn encode_mime_types<S: AsRef<str>>(
    mime_types: &[S],
    registry: &MimeRegistry,
) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    for mime_type in mime_types {
        put_mime_type(&mut buf, mime_type.as_ref(), registry)?;
    }
    Ok(buf.freeze())
}

pub fn decode_mime_types(
    mut src: Bytes,
    registry: &MimeRegistry,
) -> Result<Vec<String>, ProtocolError> {
    let mut mime_types = Vec::new();
    while src.has_remaining() {
        mime_types.push(take_mime_type(&mut src, registry)?);
    }
    Ok(mime_types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_descriptors() {
        let registry = MimeRegistry::standard();
        let bytes =
            encode_mime_types(&["application/json", "application/x-mine"], &registry).unwrap();
        assert_eq!(bytes[0], 0x85);
        assert_eq!(bytes[1] as usize, "application/x-mine".len());

        let decoded = decode_mime_types(bytes, &registry).unwrap();
        assert_eq!(decoded, vec!["application/json", "application/x-mine"]);
    }

    #[test]
    fn test_without_registry_everything_is_spelled_out() {
        let bytes = encode_mime_types(&["text/plain"], &MimeRegistry::empty()).unwrap();
        assert_eq!(bytes.len(), 1 + "text/plain".len());
    }
}
