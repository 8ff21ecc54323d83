//! Error types for studiolink-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (command envelopes).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame: bad marker, truncated body, invalid base64, etc.
    /// Decode failures are logged and the frame dropped; they are never
    /// silently turned into an empty payload.
    #[error("decode error: {0}")]
    Decode(String),

    /// No response arrived within the per-request deadline. Retriable:
    /// the remote may simply be busy (e.g. scanning 4000+ plugin slots).
    #[error("command '{command}' timed out after {elapsed:?}")]
    Timeout { command: String, elapsed: Duration },

    /// The transport disconnected. All in-flight requests fail with this
    /// exactly once; callers should reconnect with a fresh client.
    #[error("connection lost")]
    ConnectionLost,

    /// The remote executed the command and explicitly reported failure.
    /// The message is propagated verbatim; no automatic retry (commands
    /// are not guaranteed idempotent).
    #[error("remote error: {0}")]
    Remote(String),

    /// A command parameter failed local validation before being sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// True for errors a caller may reasonably retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}
