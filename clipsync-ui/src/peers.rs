use std::collections::HashMap;

use clipsync_core::{DeviceId, PeerEntry};
use tracing::debug;

/// The last pushed LAN roster, in arrival order, keyed by device id.
///
/// There is no local staleness timer: an entry lives exactly as long as the
/// snapshot that carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRoster {
    entries: Vec<PeerEntry>,
    index: HashMap<DeviceId, usize>,
}

impl PeerRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards the current roster and takes `peers` wholesale. A repeated
    /// device id keeps its first position and its latest data.
    pub fn replace(&mut self, peers: Vec<PeerEntry>) {
        self.entries.clear();
        self.index.clear();
        for peer in peers {
            match self.index.get(&peer.device_id) {
                Some(&position) => {
                    debug!(device_id = %peer.device_id, "duplicate peer in roster");
                    self.entries[position] = peer;
                }
                None => {
                    self.index.insert(peer.device_id.clone(), self.entries.len());
                    self.entries.push(peer);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, device_id: &str) -> Option<&PeerEntry> {
        self.index.get(device_id).map(|&position| &self.entries[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[PeerEntry] {
        &self.entries
    }
}

/// The peer panel is shown only in LAN mode while syncing. Visibility never
/// affects what the roster retains.
pub fn panel_visible(lan_mode: bool, paused: bool) -> bool {
    lan_mode && !paused
}
