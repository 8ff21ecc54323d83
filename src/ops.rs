//! Typed command wrappers over the raw client.
//!
//! [`Bridge`] composes a [`BridgeClient`] with the parameter cache and
//! shadow state, exposing one method per remote operation. All wrappers
//! are thin: build params, send, pick the interesting field out of the
//! response data. The plugin wrappers additionally keep the cache and
//! shadow state current.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::client::BridgeClient;
use crate::error::{BridgeError, Result};
use crate::params::{
    ContainerKey, DiscoveredParam, ParamCache, ResolvedParam, ShadowState, ShadowValue,
};

/// Transport state snapshot.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportState {
    pub playing: bool,
    pub recording: bool,
    /// Song position in ticks.
    pub position: f64,
}

/// Playback position in every representation the device reports.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayPosition {
    pub bars: i64,
    pub steps: i64,
    pub ticks: i64,
    #[serde(default)]
    pub absolute_ticks: i64,
    #[serde(default)]
    pub milliseconds: i64,
    #[serde(default)]
    pub fractional: f64,
    /// Formatted bars:steps:ticks string.
    pub hint: String,
}

/// One way of addressing a playback position. The device accepts any of
/// these; pick whichever the caller has.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    /// 1-indexed bar number.
    Bars(i64),
    /// Absolute ticks from the song start.
    Ticks(i64),
    Milliseconds(i64),
    Seconds(i64),
    /// Fraction of the song, 0.0 to 1.0.
    Fractional(f64),
}

/// One note to place in the piano roll.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// MIDI note number, 0 to 127.
    pub midi: u8,
    /// Start time in beats.
    pub time: f64,
    /// Length in beats.
    pub duration: f64,
    /// Velocity, 0.0 to 1.0.
    pub velocity: f64,
    /// Stereo position, 0.0 to 1.0 with 0.5 center.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
    /// Note color slot, 0 to 15.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u8>,
}

impl Note {
    /// A plain note with default velocity and no pan or color override.
    pub fn new(midi: u8, time: f64, duration: f64) -> Self {
        Self {
            midi,
            time,
            duration,
            velocity: 0.78,
            pan: None,
            color: None,
        }
    }
}

/// Discovery result for one plugin container.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub plugin_name: String,
    pub channel_index: i32,
    pub slot_index: i32,
    pub parameter_count: usize,
    pub parameters: Vec<DiscoveredParam>,
}

/// High-level facade over the bridge connection.
pub struct Bridge {
    client: BridgeClient,
    params: Arc<ParamCache>,
    shadow: Arc<ShadowState>,
}

impl Bridge {
    /// Wrap a connected client with fresh parameter state.
    pub fn new(client: BridgeClient) -> Self {
        Self::with_state(client, Arc::new(ParamCache::new()), Arc::new(ShadowState::new()))
    }

    /// Wrap a connected client, sharing existing parameter state.
    ///
    /// Lets a reconnecting caller keep cache and shadow entries across
    /// client instances.
    pub fn with_state(
        client: BridgeClient,
        params: Arc<ParamCache>,
        shadow: Arc<ShadowState>,
    ) -> Self {
        Self {
            client,
            params,
            shadow,
        }
    }

    /// The underlying client, for raw commands.
    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    /// The shared parameter cache.
    pub fn param_cache(&self) -> &Arc<ParamCache> {
        &self.params
    }

    /// The shared shadow state.
    pub fn shadow_state(&self) -> &Arc<ShadowState> {
        &self.shadow
    }

    /// Close the connection.
    pub async fn close(self) {
        self.client.close().await;
    }

    // Transport -----------------------------------------------------------

    pub async fn transport_start(&self) -> Result<()> {
        self.client.send("transport.start", Map::new()).await?;
        Ok(())
    }

    pub async fn transport_stop(&self) -> Result<()> {
        self.client.send("transport.stop", Map::new()).await?;
        Ok(())
    }

    pub async fn transport_record(&self) -> Result<()> {
        self.client.send("transport.record", Map::new()).await?;
        Ok(())
    }

    pub async fn transport_state(&self) -> Result<TransportState> {
        let data = self.client.send("transport.state", Map::new()).await?;
        Ok(serde_json::from_value(data)?)
    }

    // Project -------------------------------------------------------------

    pub async fn get_tempo(&self) -> Result<f64> {
        let data = self.client.send("project.get_tempo", Map::new()).await?;
        data["tempo"]
            .as_f64()
            .ok_or_else(|| BridgeError::Decode("tempo missing from response".into()))
    }

    pub async fn set_tempo(&self, bpm: f64) -> Result<()> {
        if !(10.0..=522.0).contains(&bpm) {
            return Err(BridgeError::InvalidArgument(format!(
                "tempo {bpm} outside 10..=522 BPM"
            )));
        }
        let mut params = Map::new();
        params.insert("bpm".into(), json!(bpm));
        self.client.send("project.set_tempo", params).await?;
        Ok(())
    }

    pub async fn get_position(&self) -> Result<PlayPosition> {
        let data = self.client.send("project.get_position", Map::new()).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Jump to a playback position, returning the read-back position.
    pub async fn set_position(&self, position: Position) -> Result<PlayPosition> {
        let mut params = Map::new();
        match position {
            Position::Bars(bars) => params.insert("bars".into(), json!(bars)),
            Position::Ticks(ticks) => params.insert("ticks".into(), json!(ticks)),
            Position::Milliseconds(ms) => params.insert("ms".into(), json!(ms)),
            Position::Seconds(s) => params.insert("seconds".into(), json!(s)),
            Position::Fractional(f) => {
                check_normalized("fractional position", f)?;
                params.insert("fractional".into(), json!(f))
            }
        };
        let data = self.client.send("project.set_position", params).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn undo(&self) -> Result<()> {
        self.client.send("project.undo", Map::new()).await?;
        Ok(())
    }

    pub async fn redo(&self) -> Result<()> {
        self.client.send("project.redo", Map::new()).await?;
        Ok(())
    }

    // State queries -------------------------------------------------------

    /// Channel-rack listing as raw JSON; shape varies with project content.
    pub async fn channels(&self) -> Result<Value> {
        self.client.send_discovery("state.channels", Map::new()).await
    }

    pub async fn mixer(&self) -> Result<Value> {
        self.client.send_discovery("state.mixer", Map::new()).await
    }

    pub async fn patterns(&self) -> Result<Value> {
        self.client.send("state.patterns", Map::new()).await
    }

    // Patterns ------------------------------------------------------------

    pub async fn select_pattern(&self, index: i32) -> Result<()> {
        let mut params = Map::new();
        params.insert("index".into(), json!(index));
        self.client.send("pattern.select", params).await?;
        Ok(())
    }

    /// Create a pattern, returning its index.
    pub async fn create_pattern(&self, name: &str) -> Result<i32> {
        let mut params = Map::new();
        params.insert("name".into(), json!(name));
        let data = self.client.send("pattern.create", params).await?;
        data["index"]
            .as_i64()
            .map(|i| i as i32)
            .ok_or_else(|| BridgeError::Decode("pattern index missing from response".into()))
    }

    pub async fn rename_pattern(&self, index: i32, name: &str) -> Result<()> {
        let mut params = Map::new();
        params.insert("index".into(), json!(index));
        params.insert("name".into(), json!(name));
        self.client.send("pattern.rename", params).await?;
        Ok(())
    }

    // Mixer ---------------------------------------------------------------

    pub async fn set_mixer_volume(&self, index: i32, volume: f64) -> Result<()> {
        check_normalized("volume", volume)?;
        let mut params = track_params(index);
        params.insert("volume".into(), json!(volume));
        self.client.send("mixer.set_volume", params).await?;
        Ok(())
    }

    /// Set mixer track pan. Range -1.0 (left) to 1.0 (right).
    pub async fn set_mixer_pan(&self, index: i32, pan: f64) -> Result<()> {
        if !(-1.0..=1.0).contains(&pan) {
            return Err(BridgeError::InvalidArgument(format!(
                "pan {pan} outside -1.0..=1.0"
            )));
        }
        let mut params = track_params(index);
        params.insert("pan".into(), json!(pan));
        self.client.send("mixer.set_pan", params).await?;
        Ok(())
    }

    pub async fn mute_mixer_track(&self, index: i32, mute: bool) -> Result<()> {
        let mut params = track_params(index);
        params.insert("mute".into(), json!(mute));
        self.client.send("mixer.mute", params).await?;
        Ok(())
    }

    pub async fn solo_mixer_track(&self, index: i32, solo: bool) -> Result<()> {
        let mut params = track_params(index);
        params.insert("solo".into(), json!(solo));
        self.client.send("mixer.solo", params).await?;
        Ok(())
    }

    pub async fn rename_mixer_track(&self, index: i32, name: &str) -> Result<()> {
        let mut params = track_params(index);
        params.insert("name".into(), json!(name));
        self.client.send("mixer.set_name", params).await?;
        Ok(())
    }

    /// Set mixer track color as 0xRRGGBB.
    pub async fn color_mixer_track(&self, index: i32, color: u32) -> Result<()> {
        let mut params = track_params(index);
        params.insert("color".into(), json!(color));
        self.client.send("mixer.set_color", params).await?;
        Ok(())
    }

    /// Full routing matrix as raw JSON.
    pub async fn mixer_routing(&self) -> Result<Value> {
        self.client.send_discovery("mixer.get_routing", Map::new()).await
    }

    /// Send destinations and levels for one track.
    pub async fn mixer_track_sends(&self, index: i32) -> Result<Value> {
        self.client.send("mixer.get_track_sends", track_params(index)).await
    }

    /// Create or remove a route between two mixer tracks.
    pub async fn set_mixer_route(
        &self,
        source: i32,
        destination: i32,
        enabled: bool,
    ) -> Result<()> {
        let mut params = Map::new();
        params.insert("source".into(), json!(source));
        params.insert("destination".into(), json!(destination));
        params.insert("enabled".into(), json!(enabled));
        self.client.send("mixer.set_route", params).await?;
        Ok(())
    }

    /// Set the send level of an existing route. The device rejects this
    /// for routes that do not exist; create them with
    /// [`set_mixer_route`](Self::set_mixer_route) first.
    pub async fn set_mixer_route_level(
        &self,
        source: i32,
        destination: i32,
        level: f64,
    ) -> Result<()> {
        check_normalized("send level", level)?;
        let mut params = Map::new();
        params.insert("source".into(), json!(source));
        params.insert("destination".into(), json!(destination));
        params.insert("level".into(), json!(level));
        self.client.send("mixer.set_route_level", params).await?;
        Ok(())
    }

    // Playlist ------------------------------------------------------------

    pub async fn playlist_tracks(&self) -> Result<Value> {
        self.client.send("playlist.get_tracks", Map::new()).await
    }

    pub async fn mute_playlist_track(&self, index: i32, mute: bool) -> Result<()> {
        let mut params = track_params(index);
        params.insert("mute".into(), json!(mute));
        self.client.send("playlist.mute", params).await?;
        Ok(())
    }

    pub async fn solo_playlist_track(&self, index: i32, solo: bool) -> Result<()> {
        let mut params = track_params(index);
        params.insert("solo".into(), json!(solo));
        self.client.send("playlist.solo", params).await?;
        Ok(())
    }

    pub async fn rename_playlist_track(&self, index: i32, name: &str) -> Result<()> {
        let mut params = track_params(index);
        params.insert("name".into(), json!(name));
        self.client.send("playlist.set_name", params).await?;
        Ok(())
    }

    /// Set playlist track color as 0xRRGGBB.
    pub async fn color_playlist_track(&self, index: i32, color: u32) -> Result<()> {
        let mut params = track_params(index);
        params.insert("color".into(), json!(color));
        self.client.send("playlist.set_color", params).await?;
        Ok(())
    }

    // Piano roll ----------------------------------------------------------

    /// Stage notes for the piano roll, returning the accepted note count.
    ///
    /// `channel` selects the target channel first when given; `clear_first`
    /// wipes existing notes before adding.
    pub async fn add_notes(
        &self,
        notes: &[Note],
        channel: Option<i32>,
        clear_first: bool,
    ) -> Result<usize> {
        if notes.is_empty() {
            return Err(BridgeError::InvalidArgument("no notes provided".into()));
        }
        for note in notes {
            if note.midi > 127 {
                return Err(BridgeError::InvalidArgument(format!(
                    "MIDI note {} outside 0..=127",
                    note.midi
                )));
            }
            check_normalized("velocity", note.velocity)?;
            if let Some(pan) = note.pan {
                check_normalized("pan", pan)?;
            }
        }

        let mut params = Map::new();
        params.insert("notes".into(), serde_json::to_value(notes)?);
        params.insert("clearFirst".into(), json!(clear_first));
        if let Some(channel) = channel {
            params.insert("channel".into(), json!(channel));
        }
        let data = self.client.send("pianoroll.addNotes", params).await?;
        data["noteCount"]
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| BridgeError::Decode("noteCount missing from response".into()))
    }

    /// Stage a clear of the piano roll's notes.
    pub async fn clear_notes(&self) -> Result<()> {
        self.client.send("pianoroll.clearNotes", Map::new()).await?;
        Ok(())
    }

    /// Read the piano roll state last exported by the device.
    pub async fn read_piano_roll(&self) -> Result<Value> {
        self.client.send("pianoroll.readState", Map::new()).await
    }

    // Plugins -------------------------------------------------------------

    /// Discover a plugin container's parameter table.
    ///
    /// Stores the table in the parameter cache and feeds the shadow state.
    /// Uses the discovery timeout; scanning a large plugin is slow.
    pub async fn discover_params(&self, key: ContainerKey) -> Result<PluginInfo> {
        let data = self
            .client
            .send_discovery("plugins.discover", container_params(key))
            .await?;
        let info: PluginInfo = serde_json::from_value(data)?;

        info!(
            plugin = %info.plugin_name,
            channel = key.channel_index,
            slot = key.slot_index,
            count = info.parameter_count,
            "discovered plugin parameters"
        );
        self.params
            .store(key, info.plugin_name.clone(), info.parameters.clone());
        self.shadow.populate_from_discovery(key, &info.parameters);
        Ok(info)
    }

    /// Read one parameter's current value by index.
    pub async fn get_param(&self, key: ContainerKey, index: u32) -> Result<DiscoveredParam> {
        let mut params = container_params(key);
        params.insert("paramIndex".into(), json!(index));
        let data = self.client.send("plugins.get_param", params).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Write one parameter by index. Records a user shadow entry.
    pub async fn set_param(&self, key: ContainerKey, index: u32, value: f64) -> Result<()> {
        check_normalized("value", value)?;
        let mut params = container_params(key);
        params.insert("paramIndex".into(), json!(index));
        params.insert("value".into(), json!(value));
        self.client.send("plugins.set_param", params).await?;
        self.shadow.set(key, index, value);
        Ok(())
    }

    /// Write one parameter by name.
    ///
    /// Resolves through the cache; on a cache miss for the container the
    /// facade discovers first, then retries resolution. An unresolvable
    /// name is an [`BridgeError::InvalidArgument`].
    pub async fn set_param_by_name(
        &self,
        key: ContainerKey,
        name: &str,
        value: f64,
    ) -> Result<ResolvedParam> {
        check_normalized("value", value)?;
        let resolved = match self.params.resolve(key, name) {
            Some(hit) => hit,
            None => {
                debug!(name, "name not cached, running discovery");
                self.discover_params(key).await?;
                self.params.resolve(key, name).ok_or_else(|| {
                    BridgeError::InvalidArgument(format!(
                        "no parameter matching {name:?} on channel {}, slot {}",
                        key.channel_index, key.slot_index
                    ))
                })?
            }
        };

        self.set_param(key, resolved.index, value).await?;
        Ok(resolved)
    }

    /// Step to the plugin's next preset. Parameter values change wholesale,
    /// so the container's cache and shadow entries are invalidated.
    pub async fn next_preset(&self, key: ContainerKey) -> Result<()> {
        self.client
            .send("plugins.next_preset", container_params(key))
            .await?;
        self.forget_container(key);
        Ok(())
    }

    /// Step to the plugin's previous preset. Invalidates like
    /// [`next_preset`](Self::next_preset).
    pub async fn prev_preset(&self, key: ContainerKey) -> Result<()> {
        self.client
            .send("plugins.prev_preset", container_params(key))
            .await?;
        self.forget_container(key);
        Ok(())
    }

    /// Number of presets the plugin exposes.
    pub async fn preset_count(&self, key: ContainerKey) -> Result<u32> {
        let data = self
            .client
            .send("plugins.preset_count", container_params(key))
            .await?;
        data["presetCount"]
            .as_u64()
            .map(|n| n as u32)
            .ok_or_else(|| BridgeError::Decode("presetCount missing from response".into()))
    }

    /// Last-known value for a parameter, from shadow state only.
    pub fn last_known(&self, key: ContainerKey, index: u32) -> Option<ShadowValue> {
        self.shadow.get(key, index)
    }

    fn forget_container(&self, key: ContainerKey) {
        self.params.invalidate(key);
        self.shadow.clear(key);
    }
}

fn track_params(index: i32) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("index".into(), json!(index));
    params
}

fn container_params(key: ContainerKey) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("channelIndex".into(), json!(key.channel_index));
    params.insert("slotIndex".into(), json!(key.slot_index));
    params
}

fn check_normalized(what: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(BridgeError::InvalidArgument(format!(
            "{what} {value} outside 0.0..=1.0"
        )));
    }
    Ok(())
}
