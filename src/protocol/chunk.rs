//! Chunked transfer of payloads larger than one frame.
//!
//! The transport caps every frame at a hard ceiling, but discovery-class
//! responses (a plugin's full parameter list) routinely exceed it. `split`
//! slices an encoded payload into an ordered frame sequence; all frames but
//! the last carry the continuation flag. [`Reassembler`] accumulates inbound
//! chunks per sender identity until a final frame completes the message.
//!
//! There is no per-message sequence number on the wire: reassembly relies on
//! the invariant that a sender finishes one multi-frame message before
//! starting another on the same identity. A small payload produces exactly
//! one final-flagged frame, byte-identical to an unchunked encoding, so
//! peers unaware of chunking interoperate as long as payloads stay small.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::sysex::{MsgType, RawFrame, SAFE_CAPACITY};

/// Identity of the peer a frame arrived from. One accumulation buffer is
/// kept per sender.
pub type SenderId = u32;

/// Split an encoded payload into an ordered frame sequence.
///
/// Payloads up to [`SAFE_CAPACITY`] produce exactly one final frame.
pub fn split(msg_type: MsgType, payload: &[u8]) -> Vec<RawFrame> {
    split_with_capacity(msg_type, payload, SAFE_CAPACITY)
}

/// Split with an explicit per-frame capacity.
pub fn split_with_capacity(msg_type: MsgType, payload: &[u8], capacity: usize) -> Vec<RawFrame> {
    if payload.len() <= capacity {
        return vec![RawFrame::new(
            msg_type,
            false,
            Bytes::copy_from_slice(payload),
        )];
    }

    let mut frames = Vec::with_capacity(payload.len().div_ceil(capacity));
    let mut chunks = payload.chunks(capacity).peekable();
    while let Some(chunk) = chunks.next() {
        let continuation = chunks.peek().is_some();
        frames.push(RawFrame::new(
            msg_type,
            continuation,
            Bytes::copy_from_slice(chunk),
        ));
    }
    frames
}

/// Accumulates chunked frames until a final frame completes the payload.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffers: HashMap<SenderId, BytesMut>,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one frame from a sender.
    ///
    /// Returns the completed payload when the frame is final; `None` while
    /// more chunks are expected. A frame from a sender with no open buffer
    /// starts a new one.
    pub fn absorb(&mut self, sender: SenderId, frame: &RawFrame) -> Option<Bytes> {
        if frame.continuation {
            self.buffers
                .entry(sender)
                .or_default()
                .extend_from_slice(&frame.payload);
            return None;
        }

        match self.buffers.remove(&sender) {
            Some(mut buffer) => {
                buffer.extend_from_slice(&frame.payload);
                Some(buffer.freeze())
            }
            // Single-frame message: hand the payload straight through.
            None => Some(frame.payload.clone()),
        }
    }

    /// True if the sender has an incomplete message buffered.
    pub fn has_partial(&self, sender: SenderId) -> bool {
        self.buffers.contains_key(&sender)
    }

    /// Discard all accumulation buffers. Used on disconnect.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: SenderId = 1;

    #[test]
    fn test_small_payload_single_final_frame() {
        let payload = vec![b'x'; SAFE_CAPACITY];
        let frames = split(MsgType::Response, &payload);

        assert_eq!(frames.len(), 1);
        assert!(!frames[0].continuation);
        assert_eq!(frames[0].payload.as_ref(), payload.as_slice());

        let mut reassembler = Reassembler::new();
        let complete = reassembler.absorb(DEVICE, &frames[0]).unwrap();
        assert_eq!(complete.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_split_5000_bytes_into_three_frames() {
        let payload = vec![b'Q'; 5000];
        let frames = split(MsgType::Response, &payload);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload.len(), 1800);
        assert_eq!(frames[1].payload.len(), 1800);
        assert_eq!(frames[2].payload.len(), 1400);

        let flags: Vec<bool> = frames.iter().map(|f| f.continuation).collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn test_chunked_roundtrip_byte_identical() {
        let payload: Vec<u8> = (0..4500u32).map(|i| b'A' + (i % 26) as u8).collect();
        let frames = split(MsgType::Response, &payload);
        assert!(frames.len() > 1);

        let mut reassembler = Reassembler::new();
        let mut complete = None;
        for frame in &frames {
            let result = reassembler.absorb(DEVICE, frame);
            if frame.continuation {
                assert!(result.is_none());
            } else {
                complete = result;
            }
        }

        assert_eq!(complete.unwrap().as_ref(), payload.as_slice());
        assert!(!reassembler.has_partial(DEVICE));
    }

    #[test]
    fn test_boundary_exactly_capacity_plus_one() {
        let payload = vec![b'z'; SAFE_CAPACITY + 1];
        let frames = split(MsgType::Command, &payload);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.len(), SAFE_CAPACITY);
        assert_eq!(frames[1].payload.len(), 1);
        assert!(frames[0].continuation);
        assert!(!frames[1].continuation);
    }

    #[test]
    fn test_senders_do_not_share_buffers() {
        let mut reassembler = Reassembler::new();

        reassembler.absorb(1, &RawFrame::new(MsgType::Response, true, &b"aaa"[..]));
        reassembler.absorb(2, &RawFrame::new(MsgType::Response, true, &b"bbb"[..]));

        let one = reassembler
            .absorb(1, &RawFrame::new(MsgType::Response, false, &b"111"[..]))
            .unwrap();
        let two = reassembler
            .absorb(2, &RawFrame::new(MsgType::Response, false, &b"222"[..]))
            .unwrap();

        assert_eq!(one.as_ref(), b"aaa111");
        assert_eq!(two.as_ref(), b"bbb222");
    }

    #[test]
    fn test_clear_discards_partial_messages() {
        let mut reassembler = Reassembler::new();
        reassembler.absorb(DEVICE, &RawFrame::new(MsgType::Response, true, &b"abc"[..]));
        assert!(reassembler.has_partial(DEVICE));

        reassembler.clear();
        assert!(!reassembler.has_partial(DEVICE));

        // A final frame after the clear is a fresh single-frame message.
        let complete = reassembler
            .absorb(DEVICE, &RawFrame::new(MsgType::Response, false, &b"xyz"[..]))
            .unwrap();
        assert_eq!(complete.as_ref(), b"xyz");
    }

    #[test]
    fn test_empty_final_frame_completes_buffer() {
        let mut reassembler = Reassembler::new();
        reassembler.absorb(DEVICE, &RawFrame::new(MsgType::Response, true, &b"data"[..]));

        let complete = reassembler
            .absorb(DEVICE, &RawFrame::new(MsgType::Response, false, Bytes::new()))
            .unwrap();
        assert_eq!(complete.as_ref(), b"data");
    }

    #[test]
    fn test_custom_capacity() {
        let payload = vec![b'k'; 10];
        let frames = split_with_capacity(MsgType::Command, &payload, 4);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].payload.len(), 2);
    }
}
