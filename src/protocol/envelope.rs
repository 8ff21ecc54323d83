//! Logical command/response envelopes and their payload encoding.
//!
//! Envelopes are JSON objects, base64-encoded before framing so every
//! payload byte stays 7-bit safe on the wire:
//!
//! - outbound: `{"command": "...", "id": N, "params": {...}}`
//! - inbound:  `{"id": N, "success": bool, "data"?: ..., "error"?: "..."}`
//!
//! The correlation id lives in the envelope, not the frame header; the
//! framing layer never needs to understand it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// Outbound command envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Remote operation name, e.g. `"plugins.discover"`.
    pub command: String,
    /// Correlation id matching the eventual response.
    pub id: u32,
    /// Named command parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CommandEnvelope {
    /// Create an envelope with the given command name and parameters.
    pub fn new(command: impl Into<String>, id: u32, params: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            id,
            params,
        }
    }
}

/// Inbound response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id of the command this answers.
    pub id: u32,
    /// Whether the remote reports success.
    pub success: bool,
    /// Result payload, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error message, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response with a data payload.
    pub fn ok(id: u32, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response with an error message.
    pub fn err(id: u32, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Serialize an envelope to base64-encoded JSON payload bytes.
pub fn encode_payload<T: Serialize>(envelope: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(envelope)?;
    Ok(Bytes::from(BASE64.encode(json).into_bytes()))
}

/// Deserialize an envelope from base64-encoded JSON payload bytes.
pub fn decode_payload<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T> {
    let json = BASE64
        .decode(payload)
        .map_err(|e| BridgeError::Decode(format!("base64 decode failed: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| BridgeError::Decode(format!("envelope JSON parse failed: {e}")))
}
