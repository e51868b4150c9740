//! In-memory registry of known peers, keyed by fingerprint.

use std::collections::HashMap;
use std::sync::Arc;

use lanbeam_core::DeviceInfo;
use parking_lot::Mutex;

/// Listener invoked on every insert, including refreshes of a known
/// fingerprint (hosts use this to bump freshness timestamps).
pub type PeerListener = Arc<dyn Fn(&DeviceInfo) + Send + Sync>;

/// Last-write-wins map of fingerprint to descriptor. No TTL eviction
/// within a run; stale peers are cheap to re-probe.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, DeviceInfo>>,
    listeners: Mutex<Vec<PeerListener>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Listeners run outside the lock.
    pub fn insert(&self, device: DeviceInfo) {
        self.peers
            .lock()
            .insert(device.fingerprint.clone(), device.clone());

        let listeners: Vec<PeerListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(&device);
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<DeviceInfo> {
        self.peers.lock().get(fingerprint).cloned()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.peers.lock().contains_key(fingerprint)
    }

    /// Snapshot of every known peer.
    pub fn peers(&self) -> Vec<DeviceInfo> {
        self.peers.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    pub fn on_insert(&self, listener: PeerListener) {
        self.listeners.lock().push(listener);
    }
}
