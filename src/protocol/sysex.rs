//! SysEx wire format encoding and decoding.
//!
//! Implements the 4-byte header + terminator framing:
//! ```text
//! ┌──────────────┬──────────┬──────────────┬─────────────────┬────────────┐
//! │ Marker (2B)  │ Type (1B)│ Continuation │ Payload          │ Terminator │
//! │ 0xF0 0x7D    │ 01 / 02  │ 01=more      │ base64 bytes     │ 0xF7       │
//! │              │          │ 00=final     │ (≤ safe cap)     │            │
//! └──────────────┴──────────┴──────────────┴─────────────────┴────────────┘
//! ```
//!
//! Payload bytes are base64 text, so every byte is 7-bit safe as the
//! transport requires. Decoding is transport-agnostic: it accepts any
//! complete frame, whether read directly or reassembled from chunks.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BridgeError, Result};

/// Frame start byte.
pub const FRAME_START: u8 = 0xF0;

/// Protocol marker byte (non-commercial manufacturer id).
pub const PROTOCOL_MARKER: u8 = 0x7D;

/// Frame terminator byte.
pub const FRAME_END: u8 = 0xF7;

/// Header size: start + marker + msg type + continuation flag.
pub const HEADER_SIZE: usize = 4;

/// Total framing overhead (header + terminator).
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1;

/// Hard per-frame ceiling imposed by the transport's receive buffer.
pub const FRAME_CEILING: usize = 2048;

/// Maximum encoded payload bytes per frame. Leaves ~10% headroom under
/// [`FRAME_CEILING`] for the header, terminator, and transport slack.
pub const SAFE_CAPACITY: usize = 1800;

/// Continuation flag: more chunks follow.
pub const CONTINUATION_MORE: u8 = 0x01;

/// Continuation flag: final chunk.
pub const CONTINUATION_FINAL: u8 = 0x00;

/// Message type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Outbound command (orchestrator → device).
    Command = 0x01,
    /// Inbound response (device → orchestrator).
    Response = 0x02,
}

impl MsgType {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(MsgType::Command),
            0x02 => Ok(MsgType::Response),
            other => Err(BridgeError::Decode(format!(
                "unknown message type 0x{other:02X}"
            ))),
        }
    }
}

/// One decoded physical frame.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Command or response.
    pub msg_type: MsgType,
    /// True when more chunks of the same logical message follow.
    pub continuation: bool,
    /// Base64 payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl RawFrame {
    /// Create a frame from its parts.
    pub fn new(msg_type: MsgType, continuation: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            continuation,
            payload: payload.into(),
        }
    }

    /// Total wire size of this frame once encoded.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Encode a frame into wire bytes.
///
/// The payload must already be base64 text and must not exceed
/// [`SAFE_CAPACITY`]; oversize payloads belong to the chunking layer,
/// not here.
pub fn encode_frame(frame: &RawFrame) -> Result<Bytes> {
    if frame.payload.len() > SAFE_CAPACITY {
        return Err(BridgeError::Decode(format!(
            "payload {} bytes exceeds safe capacity {}",
            frame.payload.len(),
            SAFE_CAPACITY
        )));
    }

    let mut buf = BytesMut::with_capacity(frame.wire_size());
    buf.put_u8(FRAME_START);
    buf.put_u8(PROTOCOL_MARKER);
    buf.put_u8(frame.msg_type as u8);
    buf.put_u8(if frame.continuation {
        CONTINUATION_MORE
    } else {
        CONTINUATION_FINAL
    });
    buf.put_slice(&frame.payload);
    buf.put_u8(FRAME_END);
    Ok(buf.freeze())
}

/// Decode a complete frame from wire bytes.
///
/// The input must be one whole frame: start byte through terminator.
/// Malformed input yields a typed [`BridgeError::Decode`], never an
/// empty payload.
pub fn decode_frame(data: &[u8]) -> Result<RawFrame> {
    if data.len() < FRAME_OVERHEAD {
        return Err(BridgeError::Decode(format!(
            "frame too short ({} bytes, minimum {})",
            data.len(),
            FRAME_OVERHEAD
        )));
    }
    if data[0] != FRAME_START {
        return Err(BridgeError::Decode(format!(
            "missing frame start byte (got 0x{:02X})",
            data[0]
        )));
    }
    if data[1] != PROTOCOL_MARKER {
        return Err(BridgeError::Decode(format!(
            "wrong protocol marker 0x{:02X}",
            data[1]
        )));
    }
    let last = data[data.len() - 1];
    if last != FRAME_END {
        return Err(BridgeError::Decode(format!(
            "missing frame terminator (got 0x{last:02X})"
        )));
    }

    let msg_type = MsgType::from_byte(data[2])?;
    let continuation = match data[3] {
        CONTINUATION_FINAL => false,
        CONTINUATION_MORE => true,
        other => {
            return Err(BridgeError::Decode(format!(
                "invalid continuation flag 0x{other:02X}"
            )))
        }
    };

    let payload = Bytes::copy_from_slice(&data[HEADER_SIZE..data.len() - 1]);
    Ok(RawFrame {
        msg_type,
        continuation,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = RawFrame::new(MsgType::Command, false, &b"aGVsbG8="[..]);
        let wire = encode_frame(&frame).unwrap();

        assert_eq!(wire.len(), FRAME_OVERHEAD + 8);
        assert_eq!(wire[0], FRAME_START);
        assert_eq!(wire[1], PROTOCOL_MARKER);
        assert_eq!(wire[wire.len() - 1], FRAME_END);

        let decoded = decode_frame(&wire).unwrap();
        assert_eq!(decoded.msg_type, MsgType::Command);
        assert!(!decoded.continuation);
        assert_eq!(decoded.payload.as_ref(), b"aGVsbG8=");
    }

    #[test]
    fn test_continuation_flag_byte() {
        let frame = RawFrame::new(MsgType::Response, true, &b"abcd"[..]);
        let wire = encode_frame(&frame).unwrap();
        assert_eq!(wire[3], CONTINUATION_MORE);

        let decoded = decode_frame(&wire).unwrap();
        assert!(decoded.continuation);
        assert_eq!(decoded.msg_type, MsgType::Response);
    }

    #[test]
    fn test_decode_too_short() {
        let result = decode_frame(&[FRAME_START, PROTOCOL_MARKER, 0x01]);
        assert!(matches!(result, Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_decode_bad_marker() {
        let frame = RawFrame::new(MsgType::Command, false, &b"eA=="[..]);
        let mut wire = encode_frame(&frame).unwrap().to_vec();
        wire[1] = 0x42;

        let result = decode_frame(&wire);
        assert!(matches!(result, Err(BridgeError::Decode(_))));
        assert!(result.unwrap_err().to_string().contains("protocol marker"));
    }

    #[test]
    fn test_decode_missing_terminator() {
        let frame = RawFrame::new(MsgType::Command, false, &b"eA=="[..]);
        let wire = encode_frame(&frame).unwrap();
        let truncated = &wire[..wire.len() - 1];

        // Without the terminator the last payload byte sits where F7
        // should be, so decoding must reject the frame.
        let result = decode_frame(truncated);
        assert!(matches!(result, Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_msg_type() {
        let wire = [FRAME_START, PROTOCOL_MARKER, 0x7F, 0x00, b'e', FRAME_END];
        let result = decode_frame(&wire);
        assert!(matches!(result, Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_decode_invalid_continuation() {
        let wire = [FRAME_START, PROTOCOL_MARKER, 0x01, 0x05, b'e', FRAME_END];
        let result = decode_frame(&wire);
        assert!(matches!(result, Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = RawFrame::new(MsgType::Response, false, Bytes::new());
        let wire = encode_frame(&frame).unwrap();
        assert_eq!(wire.len(), FRAME_OVERHEAD);

        let decoded = decode_frame(&wire).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let frame = RawFrame::new(MsgType::Command, false, vec![b'A'; SAFE_CAPACITY + 1]);
        assert!(encode_frame(&frame).is_err());
    }

    #[test]
    fn test_safe_capacity_leaves_headroom() {
        // A full frame must still fit under the transport ceiling.
        assert!(SAFE_CAPACITY + FRAME_OVERHEAD < FRAME_CEILING);
    }

    #[test]
    fn test_max_payload_frame() {
        let frame = RawFrame::new(MsgType::Command, true, vec![b'Q'; SAFE_CAPACITY]);
        let wire = encode_frame(&frame).unwrap();
        assert_eq!(wire.len(), SAFE_CAPACITY + FRAME_OVERHEAD);

        let decoded = decode_frame(&wire).unwrap();
        assert_eq!(decoded.payload.len(), SAFE_CAPACITY);
    }
}
