//! Parameter cache: discovered parameter tables and name resolution.
//!
//! Plugin parameters are addressed by numeric index on the wire, but
//! callers know them by name ("Cutoff", "osc 1 level"). Discovery pulls
//! the full index→name table for a plugin container once; afterwards the
//! cache resolves names locally without another round trip.
//!
//! Resolution is case-insensitive and runs in three tiers, stopping at
//! the first tier with any hit:
//!
//! 1. exact match
//! 2. prefix match, either direction
//! 3. substring match, either direction
//!
//! Within a tier the lowest parameter index wins, so resolution is
//! deterministic across calls.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies a plugin container: a channel, or a mixer effect slot.
///
/// `slot_index` is `-1` for channel-rack instruments; mixer effects use
/// the mixer track as `channel_index` and the effect slot as `slot_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    pub channel_index: i32,
    pub slot_index: i32,
}

impl ContainerKey {
    /// A channel-rack instrument container.
    pub fn channel(index: i32) -> Self {
        Self {
            channel_index: index,
            slot_index: -1,
        }
    }

    /// A mixer effect slot container.
    pub fn mixer_slot(track: i32, slot: i32) -> Self {
        Self {
            channel_index: track,
            slot_index: slot,
        }
    }
}

/// One parameter as reported by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredParam {
    /// Stable numeric index used on the wire.
    pub index: u32,
    /// Display name as the plugin reports it.
    pub name: String,
    /// Normalized value at discovery time, 0.0 to 1.0.
    pub value: f64,
    /// Plugin-formatted display value, when the device provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
}

/// A discovered plugin's full parameter table.
#[derive(Debug, Clone)]
pub struct CachedContainer {
    /// Plugin display name from discovery.
    pub plugin_name: String,
    /// Parameters in discovery order.
    pub params: Vec<DiscoveredParam>,
    /// Lowercased names paired with table positions, built once at store
    /// time so lookups never re-lowercase the table.
    lookup: Vec<(String, usize)>,
}

impl CachedContainer {
    fn new(plugin_name: String, params: Vec<DiscoveredParam>) -> Self {
        let lookup = params
            .iter()
            .enumerate()
            .map(|(pos, p)| (p.name.to_lowercase(), pos))
            .collect();
        Self {
            plugin_name,
            params,
            lookup,
        }
    }

    /// Resolve a name against this container's table.
    fn resolve(&self, query: &str) -> Option<&DiscoveredParam> {
        let query = query.to_lowercase();

        let exact = |name: &str| name == query;
        let prefix = |name: &str| name.starts_with(&query) || query.starts_with(name);
        let contains = |name: &str| name.contains(&query) || query.contains(name);

        self.best_match(exact)
            .or_else(|| self.best_match(prefix))
            .or_else(|| self.best_match(contains))
    }

    /// First table entry satisfying the predicate. Discovery order is
    /// index order, so "first" is the lowest index.
    fn best_match(&self, pred: impl Fn(&str) -> bool) -> Option<&DiscoveredParam> {
        self.lookup
            .iter()
            .find(|(name, _)| pred(name))
            .map(|&(_, pos)| &self.params[pos])
    }
}

/// A successful name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParam {
    pub index: u32,
    /// Canonical name from the table, not the caller's spelling.
    pub name: String,
}

/// Client-side cache of discovered parameter tables, one per container.
///
/// Thread safe; shared via `Arc` between the command wrappers.
#[derive(Debug, Default)]
pub struct ParamCache {
    containers: Mutex<HashMap<ContainerKey, CachedContainer>>,
}

impl ParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a container's table with fresh discovery results.
    pub fn store(
        &self,
        key: ContainerKey,
        plugin_name: impl Into<String>,
        params: Vec<DiscoveredParam>,
    ) {
        let container = CachedContainer::new(plugin_name.into(), params);
        debug!(
            channel = key.channel_index,
            slot = key.slot_index,
            plugin = %container.plugin_name,
            count = container.params.len(),
            "caching parameter table"
        );
        self.containers
            .lock()
            .expect("param cache poisoned")
            .insert(key, container);
    }

    /// Whether a container has a cached table.
    pub fn has(&self, key: ContainerKey) -> bool {
        self.containers
            .lock()
            .expect("param cache poisoned")
            .contains_key(&key)
    }

    /// Resolve a parameter name within a container.
    ///
    /// `None` means either the container has never been discovered or no
    /// tier matched; neither is an error at this layer.
    pub fn resolve(&self, key: ContainerKey, query: &str) -> Option<ResolvedParam> {
        let containers = self.containers.lock().expect("param cache poisoned");
        let param = containers.get(&key)?.resolve(query)?;
        Some(ResolvedParam {
            index: param.index,
            name: param.name.clone(),
        })
    }

    /// Plugin name of a cached container.
    pub fn plugin_name(&self, key: ContainerKey) -> Option<String> {
        let containers = self.containers.lock().expect("param cache poisoned");
        containers.get(&key).map(|c| c.plugin_name.clone())
    }

    /// Snapshot of a container's parameter table.
    pub fn params(&self, key: ContainerKey) -> Option<Vec<DiscoveredParam>> {
        let containers = self.containers.lock().expect("param cache poisoned");
        containers.get(&key).map(|c| c.params.clone())
    }

    /// Drop a container's table, forcing rediscovery on next use.
    pub fn invalidate(&self, key: ContainerKey) {
        self.containers
            .lock()
            .expect("param cache poisoned")
            .remove(&key);
    }

    /// Drop every cached table.
    pub fn clear(&self) {
        self.containers
            .lock()
            .expect("param cache poisoned")
            .clear();
    }
}
