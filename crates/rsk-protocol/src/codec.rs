//! Tokio codec for length-prefixed frames on byte-stream transports
//!
//! Message-oriented transports (WebSocket) carry one frame per message.
//! Byte streams (TCP) prefix every frame with its length as a 24-bit
//! big-endian integer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::HEADER_SIZE;

/// Size of the frame length prefix
pub const LENGTH_PREFIX_SIZE: usize = 3;

/// Largest frame that fits the length prefix
pub const MAX_FRAME_LENGTH: usize = 0x00FF_FFFF;

/// Splits a byte stream into raw frames and prefixes outgoing frames
#[derive(Debug, Default)]
pub struct FrameLengthCodec {
    /// Length of the frame being decoded (if its prefix was already read)
    pending_length: Option<usize>,
}

impl FrameLengthCodec {
    pub fn new() -> Self {
        Self {
            pending_length: None,
        }
    }
}

impl Decoder for FrameLengthCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match self.pending_length.take() {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let len = ((src[0] as usize) << 16) | ((src[1] as usize) << 8) | src[2] as usize;
                src.advance(LENGTH_PREFIX_SIZE);
                if len < HEADER_SIZE {
                    return Err(ProtocolError::Malformed(format!(
                        "frame length {} is shorter than the header",
                        len
                    )));
                }
                len
            }
        };

        if src.len() < length {
            self.pending_length = Some(length);
            src.reserve(length - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for FrameLengthCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.len() > MAX_FRAME_LENGTH {
            return Err(ProtocolError::PayloadTooLarge {
                size: frame.len(),
                max: MAX_FRAME_LENGTH,
            });
        }
        dst.reserve(LENGTH_PREFIX_SIZE + frame.len());
        dst.put_u8((frame.len() >> 16) as u8);
        dst.put_u16(frame.len() as u16);
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
