//! Frame scanner for accumulating partial reads.
//!
//! The transport delivers raw bytes with no alignment guarantee: one read
//! may carry half a frame or three frames back to back. The scanner buffers
//! bytes in a `bytes::BytesMut` and extracts complete start-to-terminator
//! spans. Bytes seen outside a frame (foreign traffic on the bus) are
//! discarded.
//!
//! Malformed spans are logged and dropped here, per the connection-level
//! error policy; they never abort the read loop.

use bytes::{Buf, BytesMut};
use tracing::warn;

use super::sysex::{decode_frame, RawFrame, FRAME_CEILING, FRAME_END, FRAME_START};

/// Buffer for incoming bytes that yields complete frames.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buffer: BytesMut,
}

impl FrameScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_CEILING),
        }
    }

    /// Push data into the scanner and extract all complete frames.
    ///
    /// Returns the frames completed by this chunk of data (possibly none).
    /// Partial trailing data stays buffered for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(span) = self.take_span() {
            match decode_frame(&span) {
                Ok(frame) => frames.push(frame),
                Err(err) => warn!("dropping malformed frame: {err}"),
            }
        }
        frames
    }

    /// Extract the next complete `F0..F7` span, discarding leading junk.
    fn take_span(&mut self) -> Option<BytesMut> {
        loop {
            // Discard anything before the next start byte.
            match self.buffer.iter().position(|&b| b == FRAME_START) {
                Some(0) => {}
                Some(offset) => self.buffer.advance(offset),
                None => {
                    self.buffer.clear();
                    return None;
                }
            }

            match self.buffer.iter().position(|&b| b == FRAME_END) {
                Some(end) => return Some(self.buffer.split_to(end + 1)),
                // Every legal frame fits under the ceiling; an open span
                // beyond that can never terminate into a valid frame.
                // Skip its start byte and resync on the next one.
                None if self.buffer.len() > FRAME_CEILING => {
                    warn!(
                        pending = self.buffer.len(),
                        "unterminated frame exceeds ceiling, resyncing"
                    );
                    self.buffer.advance(1);
                }
                None => return None,
            }
        }
    }

    /// Number of buffered bytes awaiting a terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes. Used on disconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
