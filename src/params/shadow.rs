//! Shadow state: last-known parameter values.
//!
//! The device never pushes unsolicited updates, so the client keeps its
//! own record of what it last learned. Each entry is tagged with where
//! the value came from: an explicit set by the user of this client, or a
//! discovery snapshot. User values are authoritative and a later
//! discovery snapshot must not overwrite them; the user's write is newer
//! information than the device-side scan it raced with.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tracing::debug;

use super::cache::{ContainerKey, DiscoveredParam};

/// Where a shadow value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Explicitly set through this client.
    User,
    /// Reported by a discovery snapshot.
    Discovered,
}

/// One remembered parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowValue {
    /// Normalized value, 0.0 to 1.0.
    pub value: f64,
    pub source: ValueSource,
    /// When this entry was recorded.
    pub updated_at: Instant,
}

/// Last-known values for every parameter the client has touched or seen.
#[derive(Debug, Default)]
pub struct ShadowState {
    entries: Mutex<HashMap<(ContainerKey, u32), ShadowValue>>,
}

impl ShadowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user-set value. Always overwrites.
    pub fn set(&self, key: ContainerKey, index: u32, value: f64) {
        let entry = ShadowValue {
            value,
            source: ValueSource::User,
            updated_at: Instant::now(),
        };
        self.entries
            .lock()
            .expect("shadow state poisoned")
            .insert((key, index), entry);
    }

    /// Absorb a discovery snapshot for a container.
    ///
    /// Fills gaps and refreshes earlier discovery entries, but never
    /// replaces a [`ValueSource::User`] entry.
    pub fn populate_from_discovery(&self, key: ContainerKey, params: &[DiscoveredParam]) {
        let mut entries = self.entries.lock().expect("shadow state poisoned");
        let now = Instant::now();
        let mut skipped = 0usize;
        for param in params {
            let slot = entries.entry((key, param.index));
            match slot {
                std::collections::hash_map::Entry::Occupied(mut occupied)
                    if occupied.get().source == ValueSource::Discovered =>
                {
                    occupied.insert(ShadowValue {
                        value: param.value,
                        source: ValueSource::Discovered,
                        updated_at: now,
                    });
                }
                std::collections::hash_map::Entry::Occupied(_) => skipped += 1,
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    vacant.insert(ShadowValue {
                        value: param.value,
                        source: ValueSource::Discovered,
                        updated_at: now,
                    });
                }
            }
        }
        if skipped > 0 {
            debug!(
                channel = key.channel_index,
                slot = key.slot_index,
                skipped, "discovery left user-set values untouched"
            );
        }
    }

    /// Last-known value for a parameter, if any.
    pub fn get(&self, key: ContainerKey, index: u32) -> Option<ShadowValue> {
        self.entries
            .lock()
            .expect("shadow state poisoned")
            .get(&(key, index))
            .copied()
    }

    /// Forget everything known about one container.
    pub fn clear(&self, key: ContainerKey) {
        self.entries
            .lock()
            .expect("shadow state poisoned")
            .retain(|(k, _), _| *k != key);
    }

    /// Number of remembered values across all containers.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("shadow state poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
