//! Connector registry (C9): the set of known remote repositories, and notification of
//! registered consumers (C10 is one) on join, leave, and local-connector change.
//!
//! All mutation happens inside one critical section on [`RegistryState`], guarded by
//! `tokio::sync::RwLock` so read fan-out (many concurrent readers) doesn't serialize on registry
//! access, matching spec.md §5's "single critical-section discipline per structure" rule. No
//! lock is held across an `.await` that reaches a connector.

use std::sync::Arc;

use async_trait::async_trait;
use omrs_types::ids::MetadataCollectionId;
use tokio::sync::RwLock;

use crate::collection::Collection;

/// Callbacks C9 delivers to every registered consumer (spec.md §4.2's "C9 invokes three
/// callbacks").
#[async_trait]
pub trait FederationListener: Send + Sync {
    async fn set_local_connector(&self, id: MetadataCollectionId, connector: Arc<dyn Collection>);
    async fn add_remote_connector(&self, id: MetadataCollectionId, connector: Arc<dyn Collection>);
    async fn remove_remote_connector(&self, id: MetadataCollectionId);
}

#[derive(Default)]
struct RegistryState {
    local: Option<(MetadataCollectionId, Arc<dyn Collection>)>,
    remotes: Vec<(MetadataCollectionId, Arc<dyn Collection>)>,
    consumers: Vec<(u64, Arc<dyn FederationListener>)>,
    next_consumer_id: u64,
}

/// Maintains the set of known remote repositories and notifies registered
/// [`FederationListener`]s on join, leave, and local-connector change (spec.md §4.4).
pub struct ConnectorRegistry {
    state: RwLock<RegistryState>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registers a consumer (C10 does this at construction per spec.md §4.2) and returns an
    /// opaque id usable with [`Self::unregister_connector_consumer`].
    pub async fn register_connector_consumer(&self, consumer: Arc<dyn FederationListener>) -> u64 {
        let mut state = self.state.write().await;
        let id = state.next_consumer_id;
        state.next_consumer_id += 1;
        state.consumers.push((id, consumer));
        id
    }

    pub async fn unregister_connector_consumer(&self, consumer_id: u64) {
        let mut state = self.state.write().await;
        state.consumers.retain(|(id, _)| *id != consumer_id);
    }

    pub async fn set_local_connector(&self, id: MetadataCollectionId, connector: Arc<dyn Collection>) {
        let consumers = {
            let mut state = self.state.write().await;
            state.local = Some((id, connector.clone()));
            state.consumers.iter().map(|(_, c)| c.clone()).collect::<Vec<_>>()
        };
        for consumer in consumers {
            consumer.set_local_connector(id, connector.clone()).await;
        }
    }

    pub async fn add_remote_connector(&self, id: MetadataCollectionId, connector: Arc<dyn Collection>) {
        let consumers = {
            let mut state = self.state.write().await;
            state.remotes.push((id, connector.clone()));
            state.consumers.iter().map(|(_, c)| c.clone()).collect::<Vec<_>>()
        };
        for consumer in consumers {
            consumer.add_remote_connector(id, connector.clone()).await;
        }
    }

    pub async fn remove_remote_connector(&self, id: MetadataCollectionId) {
        let consumers = {
            let mut state = self.state.write().await;
            state.remotes.retain(|(remote_id, _)| *remote_id != id);
            state.consumers.iter().map(|(_, c)| c.clone()).collect::<Vec<_>>()
        };
        for consumer in consumers {
            consumer.remove_remote_connector(id).await;
        }
    }

    /// Snapshots the current connector list, local connector first if present, matching
    /// spec.md §4.2's "guarantees the local connector, if present, is iterated first".
    pub async fn snapshot(&self) -> Vec<(MetadataCollectionId, Arc<dyn Collection>)> {
        let state = self.state.read().await;
        let mut connectors = Vec::with_capacity(state.remotes.len() + 1);
        if let Some(local) = &state.local {
            connectors.push(local.clone());
        }
        connectors.extend(state.remotes.iter().cloned());
        connectors
    }

    /// Disconnects every remote connector on shutdown; the local connector is managed by its
    /// owner (spec.md §4.4).
    pub async fn shutdown(&self) {
        let remote_ids = {
            let state = self.state.read().await;
            state.remotes.iter().map(|(id, _)| *id).collect::<Vec<_>>()
        };
        for id in remote_ids {
            self.remove_remote_connector(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::test_support::InMemoryCollection;

    use super::*;

    struct CountingListener {
        adds: AtomicUsize,
        removes: AtomicUsize,
    }

    #[async_trait]
    impl FederationListener for CountingListener {
        async fn set_local_connector(&self, _id: MetadataCollectionId, _connector: Arc<dyn Collection>) {}

        async fn add_remote_connector(&self, _id: MetadataCollectionId, _connector: Arc<dyn Collection>) {
            self.adds.fetch_add(1, Ordering::SeqCst);
        }

        async fn remove_remote_connector(&self, _id: MetadataCollectionId) {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn join_and_leave_notify_consumers() {
        let registry = ConnectorRegistry::new();
        let listener = Arc::new(CountingListener {
            adds: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        });
        registry.register_connector_consumer(listener.clone()).await;

        let remote_id = MetadataCollectionId::generate();
        registry
            .add_remote_connector(remote_id, Arc::new(InMemoryCollection::new()))
            .await;
        assert_eq!(listener.adds.load(Ordering::SeqCst), 1);

        registry.remove_remote_connector(remote_id).await;
        assert_eq!(listener.removes.load(Ordering::SeqCst), 1);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn local_connector_is_iterated_first() {
        let registry = ConnectorRegistry::new();
        let local_id = MetadataCollectionId::generate();
        let remote_id = MetadataCollectionId::generate();
        registry
            .add_remote_connector(remote_id, Arc::new(InMemoryCollection::new()))
            .await;
        registry
            .set_local_connector(local_id, Arc::new(InMemoryCollection::new()))
            .await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].0, local_id);
        assert_eq!(snapshot[1].0, remote_id);
    }
}
