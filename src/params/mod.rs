//! Plugin parameter knowledge kept on the client side.
//!
//! - [`cache`] - discovered parameter tables with fuzzy name resolution
//! - [`shadow`] - last-known parameter values, since the device cannot
//!   push unsolicited updates

pub mod cache;
pub mod shadow;

pub use cache::{CachedContainer, ContainerKey, DiscoveredParam, ParamCache, ResolvedParam};
pub use shadow::{ShadowState, ShadowValue, ValueSource};
