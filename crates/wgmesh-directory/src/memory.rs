//! In-memory directory, for tests and local runs without a cluster

use crate::client::DirectoryClient;
use crate::error::{DirectoryError, Result};
use crate::records::{GatewayRecord, PeerRecord, RecordKind, SelfRecord, UpsertOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Store {
    peers: Vec<PeerRecord>,
    gateways: Vec<GatewayRecord>,
    unavailable: bool,
    writes: usize,
}

/// A [`DirectoryClient`] backed by a shared in-memory store.
///
/// Clones share the store, and [`InMemoryDirectory::for_identity`] gives
/// another node a view over the same store, so several reconcilers can be
/// run against one directory.
#[derive(Clone)]
pub struct InMemoryDirectory {
    store: Arc<Mutex<Store>>,
    identity: String,
}

impl InMemoryDirectory {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            identity: identity.into(),
        }
    }

    /// A client for another node, sharing this directory's records
    pub fn for_identity(&self, identity: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            identity: identity.into(),
        }
    }

    /// Insert or replace a peer record by name
    pub fn put_peer(&self, record: PeerRecord) {
        let mut store = self.store.lock();
        match store.peers.iter_mut().find(|p| p.name == record.name) {
            Some(existing) => *existing = record,
            None => store.peers.push(record),
        }
    }

    /// Insert or replace a gateway record by name
    pub fn put_gateway(&self, record: GatewayRecord) {
        let mut store = self.store.lock();
        match store.gateways.iter_mut().find(|g| g.name == record.name) {
            Some(existing) => *existing = record,
            None => store.gateways.push(record),
        }
    }

    pub fn remove_peer(&self, name: &str) {
        self.store.lock().peers.retain(|p| p.name != name);
    }

    pub fn remove_gateway(&self, name: &str) {
        self.store.lock().gateways.retain(|g| g.name != name);
    }

    /// Make every call fail with [`DirectoryError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.store.lock().unavailable = unavailable;
    }

    /// Number of create/update/delete writes that reached the store
    pub fn write_count(&self) -> usize {
        self.store.lock().writes
    }

    pub fn peer(&self, name: &str) -> Option<PeerRecord> {
        self.store.lock().peers.iter().find(|p| p.name == name).cloned()
    }

    pub fn gateway(&self, name: &str) -> Option<GatewayRecord> {
        self.store
            .lock()
            .gateways
            .iter()
            .find(|g| g.name == name)
            .cloned()
    }

    fn check_available(store: &Store) -> Result<()> {
        if store.unavailable {
            return Err(DirectoryError::Unavailable(
                "in-memory directory marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn gateways(&self) -> Result<Vec<GatewayRecord>> {
        let store = self.store.lock();
        Self::check_available(&store)?;
        Ok(store.gateways.clone())
    }

    async fn peers(&self) -> Result<Vec<PeerRecord>> {
        let store = self.store.lock();
        Self::check_available(&store)?;
        Ok(store.peers.clone())
    }

    async fn upsert_self_record(&self, record: &SelfRecord) -> Result<UpsertOutcome> {
        let mut store = self.store.lock();
        Self::check_available(&store)?;

        let outcome = match record {
            SelfRecord::Peer(peer) => {
                let desired = PeerRecord {
                    name: self.identity.clone(),
                    ..peer.clone()
                };
                match store.peers.iter_mut().find(|p| p.name == self.identity) {
                    Some(existing) if *existing == desired => UpsertOutcome::Unchanged,
                    Some(existing) => {
                        *existing = desired;
                        UpsertOutcome::Updated
                    }
                    None => {
                        store.peers.push(desired);
                        UpsertOutcome::Created
                    }
                }
            }
            SelfRecord::Gateway(gateway) => {
                let desired = GatewayRecord {
                    name: self.identity.clone(),
                    ..gateway.clone()
                };
                match store.gateways.iter_mut().find(|g| g.name == self.identity) {
                    Some(existing) if *existing == desired => UpsertOutcome::Unchanged,
                    Some(existing) => {
                        *existing = desired;
                        UpsertOutcome::Updated
                    }
                    None => {
                        store.gateways.push(desired);
                        UpsertOutcome::Created
                    }
                }
            }
        };

        if outcome != UpsertOutcome::Unchanged {
            store.writes += 1;
        }
        Ok(outcome)
    }

    async fn delete_self_record(&self, kind: RecordKind) -> Result<bool> {
        let mut store = self.store.lock();
        Self::check_available(&store)?;

        let before;
        let after;
        match kind {
            RecordKind::Peer => {
                before = store.peers.len();
                store.peers.retain(|p| p.name != self.identity);
                after = store.peers.len();
            }
            RecordKind::Gateway => {
                before = store.gateways.len();
                store.gateways.retain(|g| g.name != self.identity);
                after = store.gateways.len();
            }
        }

        let deleted = after < before;
        if deleted {
            store.writes += 1;
        }
        Ok(deleted)
    }
}
