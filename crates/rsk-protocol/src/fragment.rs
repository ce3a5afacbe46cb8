//! Reassembly of fragmented payloads
//!
//! A fragmented payload arrives as a sequence of frames on the same stream;
//! every frame but the last carries the FOLLOWS flag. Data and metadata of
//! each fragment are concatenated independently.

use bytes::BytesMut;

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::payload::Payload;

/// Progress of a [`FragmentContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentState {
    /// No fragment received yet
    Empty,
    /// At least one fragment received, more expected
    Accumulating,
    /// Last fragment received, payload can be taken
    Complete,
}

/// Accumulates the fragments of one logical payload
#[derive(Debug)]
pub struct FragmentContext {
    data: BytesMut,
    metadata: BytesMut,
    has_metadata: bool,
    fragments: usize,
    state: FragmentState,
}

impl Default for FragmentContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentContext {
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            metadata: BytesMut::new(),
            has_metadata: false,
            fragments: 0,
            state: FragmentState::Empty,
        }
    }

    pub fn state(&self) -> FragmentState {
        self.state
    }

    /// Number of fragments added since the last [`get`](Self::get)
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Whether any fragment carried the metadata flag
    pub fn has_metadata(&self) -> bool {
        self.has_metadata
    }

    /// Append one fragment; `follows` is the fragment's FOLLOWS flag
    pub fn add(&mut self, fragment: &Payload, follows: bool) -> Result<(), ProtocolError> {
        if self.state == FragmentState::Complete {
            return Err(ProtocolError::FragmentAfterComplete);
        }
        self.data.extend_from_slice(&fragment.data);
        self.metadata.extend_from_slice(&fragment.metadata);
        self.has_metadata |= fragment.has_metadata();
        self.fragments += 1;
        self.state = if follows {
            FragmentState::Accumulating
        } else {
            FragmentState::Complete
        };
        Ok(())
    }

    /// Append the payload of a frame, using its FOLLOWS and METADATA flags
    pub fn add_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let payload = frame
            .payload()
            .ok_or_else(|| ProtocolError::Malformed(format!(
                "{} frame carries no payload",
                frame.frame_type()
            )))?;
        self.add(payload, frame.fragment_follows())?;
        self.has_metadata |= frame.has_metadata();
        Ok(())
    }

    /// Take the reassembled payload and reset to [`FragmentState::Empty`]
    pub fn get(&mut self) -> Result<Payload, ProtocolError> {
        if self.state != FragmentState::Complete {
            return Err(ProtocolError::IncompletePayload);
        }
        let payload = Payload {
            data: self.data.split().freeze(),
            metadata: self.metadata.split().freeze(),
        };
        self.has_metadata = false;
        self.fragments = 0;
        self.state = FragmentState::Empty;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FrameBuilder;

    #[test]
    fn test_single_fragment() {
        let mut ctx = FragmentContext::new();
        ctx.add(&Payload::new("data", "meta"), false).unwrap();
        assert_eq!(ctx.state(), FragmentState::Complete);
        assert_eq!(ctx.get().unwrap(), Payload::new("data", "meta"));
        assert_eq!(ctx.state(), FragmentState::Empty);
    }

    #[test]
    fn test_get_before_complete_fails() {
        let mut ctx = FragmentContext::new();
        assert!(matches!(ctx.get(), Err(ProtocolError::IncompletePayload)));

        ctx.add(&Payload::from_data("part"), true).unwrap();
        assert_eq!(ctx.state(), FragmentState::Accumulating);
        assert!(matches!(ctx.get(), Err(ProtocolError::IncompletePayload)));
    }

    #[test]
    fn test_add_after_complete_fails() {
        let mut ctx = FragmentContext::new();
        ctx.add(&Payload::from_data("done"), false).unwrap();
        assert!(matches!(
            ctx.add(&Payload::from_data("late"), false),
            Err(ProtocolError::FragmentAfterComplete)
        ));
    }

    #[test]
    fn test_sections_are_concatenated_independently() {
        let mut ctx = FragmentContext::new();
        ctx.add(&Payload::new("ab", "12"), true).unwrap();
        ctx.add(&Payload::new("cd", "3"), true).unwrap();
        ctx.add(&Payload::new("e", ""), false).unwrap();

        assert_eq!(ctx.fragments(), 3);
        let payload = ctx.get().unwrap();
        assert_eq!(&payload.data[..], b"abcde");
        assert_eq!(&payload.metadata[..], b"123");
    }

    #[test]
    fn test_fragmentation_is_reversible() {
        let metadata: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 13) as u8).collect();
        let original = Payload::new(data, metadata);

        for fragment_size in [64, 100, 199, 200, 201, 1199] {
            let frames = FrameBuilder::request_response()
                .stream_id(1)
                .payload(original.clone())
                .fragment_size(fragment_size)
                .build_fragments()
                .unwrap();
            assert!(frames.len() > 1);

            let mut ctx = FragmentContext::new();
            for frame in &frames {
                let decoded = Frame::decode(frame.encode()).unwrap();
                ctx.add_frame(&decoded).unwrap();
            }
            assert!(ctx.has_metadata());
            assert_eq!(ctx.get().unwrap(), original, "fragment size {}", fragment_size);
        }
    }
}
