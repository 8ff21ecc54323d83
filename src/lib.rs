//! # studiolink-client
//!
//! Rust client SDK for the StudioLink DAW bridge protocol.
//!
//! Drives a DAW remotely over a MIDI-style control bus: commands go out
//! as base64 JSON envelopes inside SysEx-framed messages, responses come
//! back the same way and are matched to their commands by correlation id.
//!
//! ## Architecture
//!
//! - **Framing** (`protocol`): bit-exact frames, stream scanning, and
//!   chunking for payloads above the per-frame capacity
//! - **Client** (`client`): connection ownership, pending-request table,
//!   timeouts, dedicated writer task
//! - **Parameter state** (`params`): discovered parameter tables with
//!   fuzzy name resolution, plus last-known values
//! - **Operations** (`ops`): typed wrappers, one method per remote command
//!
//! ## Example
//!
//! ```ignore
//! use studiolink_client::{Bridge, BridgeClient, ContainerKey};
//! use studiolink_client::transport::{default_bridge_path, BridgeStream};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = BridgeStream::connect(&default_bridge_path()).await?;
//!     let (reader, writer) = stream.into_split();
//!     let bridge = Bridge::new(BridgeClient::connect(reader, writer));
//!
//!     bridge.set_tempo(128.0).await?;
//!     bridge
//!         .set_param_by_name(ContainerKey::channel(0), "cutoff", 0.6)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ops;
pub mod params;
pub mod protocol;
pub mod transport;

mod client;
mod writer;

pub use client::{BridgeClient, BridgeClientBuilder, ConnState};
pub use config::{BridgeConfig, Endpoints};
pub use error::BridgeError;
pub use ops::{Bridge, Note, PlayPosition, PluginInfo, Position, TransportState};
pub use params::{ContainerKey, DiscoveredParam, ParamCache, ResolvedParam, ShadowState};
