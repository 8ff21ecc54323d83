//! Protocol module - wire framing, chunking, and command envelopes.
//!
//! Layering, bottom up:
//! - [`sysex`] - bit-exact frame encoding (marker, type, continuation,
//!   base64 payload, terminator)
//! - [`scanner`] - extracts complete frames from an unaligned byte stream
//! - [`chunk`] - splits oversize payloads across frames and reassembles them
//! - [`envelope`] - the JSON command/response envelopes inside payloads

pub mod chunk;
pub mod envelope;
pub mod scanner;
pub mod sysex;

pub use chunk::{split, Reassembler, SenderId};
pub use envelope::{decode_payload, encode_payload, CommandEnvelope, ResponseEnvelope};
pub use scanner::FrameScanner;
pub use sysex::{
    decode_frame, encode_frame, MsgType, RawFrame, FRAME_CEILING, FRAME_OVERHEAD, HEADER_SIZE,
    SAFE_CAPACITY,
};
