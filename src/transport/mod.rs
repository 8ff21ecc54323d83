//! Transport module - platform-specific connection to the bridge helper.
//!
//! The device side of the bridge runs a small helper process that exposes
//! the control bus locally:
//! - Unix: Unix Domain Socket (Linux/macOS)
//! - Windows: Named Pipe
//!
//! # Example
//!
//! ```ignore
//! use studiolink_client::transport::{default_bridge_path, BridgeStream};
//!
//! let stream = BridgeStream::connect(&default_bridge_path()).await?;
//! let (reader, writer) = stream.into_split();
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::Endpoints;
use crate::error::Result;

/// Well-known path of the helper's control socket.
///
/// Format:
/// - Unix: `/tmp/studiolink-bridge.sock`
/// - Windows: `\\.\pipe\studiolink-bridge`
pub fn default_bridge_path() -> String {
    #[cfg(unix)]
    {
        "/tmp/studiolink-bridge.sock".to_string()
    }

    #[cfg(windows)]
    {
        r"\\.\pipe\studiolink-bridge".to_string()
    }
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use crate::error::Result;
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::UnixStream;

    /// Connected Unix Domain Socket to the bridge helper.
    pub struct BridgeStream {
        stream: UnixStream,
    }

    impl BridgeStream {
        /// Connect to the helper's socket path.
        pub async fn connect(path: &str) -> Result<Self> {
            let stream = UnixStream::connect(path).await?;
            Ok(Self { stream })
        }

        /// Split into owned read and write halves for the client tasks.
        pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
            self.stream.into_split()
        }

        /// Get a reference to the underlying stream.
        pub fn inner(&self) -> &UnixStream {
            &self.stream
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use crate::error::Result;
    use tokio::io::{ReadHalf, WriteHalf};
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};

    /// Connected Named Pipe to the bridge helper.
    pub struct BridgeStream {
        pipe: NamedPipeClient,
    }

    impl BridgeStream {
        /// Connect to the helper's pipe path.
        pub async fn connect(path: &str) -> Result<Self> {
            let pipe = ClientOptions::new().open(path)?;
            Ok(Self { pipe })
        }

        /// Split into read and write halves for the client tasks.
        pub fn into_split(self) -> (ReadHalf<NamedPipeClient>, WriteHalf<NamedPipeClient>) {
            tokio::io::split(self.pipe)
        }

        /// Get a reference to the underlying pipe.
        pub fn inner(&self) -> &NamedPipeClient {
            &self.pipe
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::BridgeStream;

#[cfg(windows)]
pub use windows_impl::BridgeStream;

/// Connect the two logical channels of the control bus.
///
/// Helpers that expose separate outbound and inbound channels (the bus
/// is unidirectional per channel) get one connection each: commands go
/// down the outbound channel's write half, responses come back on the
/// inbound channel's read half. With a single bidirectional helper,
/// point both endpoints at the same path.
pub async fn connect_endpoints(
    endpoints: &Endpoints,
) -> Result<(
    impl AsyncRead + Unpin + Send + 'static,
    impl AsyncWrite + Unpin + Send + 'static,
)> {
    let outbound = BridgeStream::connect(&endpoints.outbound).await?;
    let inbound = if endpoints.inbound == endpoints.outbound {
        None
    } else {
        Some(BridgeStream::connect(&endpoints.inbound).await?)
    };

    let (out_reader, writer) = outbound.into_split();
    let reader = match inbound {
        Some(stream) => stream.into_split().0,
        None => out_reader,
    };
    Ok((reader, writer))
}

/// In-process transport pair for tests and examples.
///
/// Returns `(client_side, device_side)`, each a `(reader, writer)` pair
/// already cross-wired.
pub fn memory_pair() -> (
    (impl AsyncRead + Unpin + Send, impl AsyncWrite + Unpin + Send),
    (impl AsyncRead + Unpin + Send, impl AsyncWrite + Unpin + Send),
) {
    let (client_rx, device_tx) = tokio::io::duplex(64 * 1024);
    let (device_rx, client_tx) = tokio::io::duplex(64 * 1024);
    ((client_rx, client_tx), (device_rx, device_tx))
}
