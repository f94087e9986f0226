//! Keys already configured on the local device

use std::collections::HashSet;
use wgmesh_overlay::{DeviceState, WgKey};

/// The set of peer public keys known to be present on the device.
///
/// Never persisted. It is seeded from the live device at startup because
/// the device can outlive the process that configured it.
#[derive(Debug, Clone, Default)]
pub struct AppliedPeerCache {
    keys: HashSet<WgKey>,
}

impl AppliedPeerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding every peer the device currently reports
    pub fn seeded_from(device: &DeviceState) -> Self {
        Self {
            keys: device.peers.iter().map(|p| p.public_key).collect(),
        }
    }

    pub fn contains(&self, key: &WgKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already cached
    pub fn insert(&mut self, key: WgKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: &WgKey) -> bool {
        self.keys.remove(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Cached keys missing from `desired`, sorted for stable ordering
    pub fn stale<'a>(&self, desired: impl IntoIterator<Item = &'a WgKey>) -> Vec<WgKey> {
        let desired: HashSet<&WgKey> = desired.into_iter().collect();
        let mut stale: Vec<WgKey> = self
            .keys
            .iter()
            .filter(|k| !desired.contains(k))
            .copied()
            .collect();
        stale.sort();
        stale
    }
}
