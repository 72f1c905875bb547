//! Enterprise federator (C10): presents a single logical repository whose contents are the
//! union of the local repository and every remote repository the [`ConnectorRegistry`]
//! currently knows about.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use error_stack::{Result, ResultExt};
use omrs_types::{entity::Entity, ids::InstanceGuid, relationship::Relationship};

use crate::{
    collection::Collection,
    error::{NoHomeForInstance, NoRepositories, RepositoryError},
    registry::{ConnectorRegistry, FederationListener},
};

/// The outcome of a deadline-bounded federated read (spec.md §5's cancellation rule).
#[derive(Debug, Clone)]
pub enum FederatedResult<T> {
    /// Every registered connector was consulted.
    Complete(T),
    /// The deadline expired mid-fan-out; in-flight connector calls were abandoned.
    Partial(T),
}

impl<T> FederatedResult<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Complete(value) | Self::Partial(value) => value,
        }
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Presents the union of the local repository and every known remote repository (spec.md §4.2).
pub struct EnterpriseFederator {
    registry: Arc<ConnectorRegistry>,
}

impl EnterpriseFederator {
    /// Registers itself with `registry` as a [`FederationListener`] at construction, matching
    /// spec.md §4.2's "C10 registers itself with C9 as a consumer at construction".
    pub async fn new(registry: Arc<ConnectorRegistry>, self_arc: Arc<dyn FederationListener>) -> Self {
        registry.register_connector_consumer(self_arc).await;
        Self { registry }
    }

    /// The home connector for an instance: the one whose collection id matches either
    /// `metadataCollectionId` or `replicatedBy` (spec.md §4.2's "Home resolution").
    pub async fn home_connector(
        &self,
        provenance: &omrs_types::provenance::Provenance,
    ) -> Result<Arc<dyn Collection>, NoHomeForInstance> {
        let home_id = provenance.routing_home();
        let connectors = self.registry.snapshot().await;
        connectors
            .into_iter()
            .find(|(id, _)| *id == home_id)
            .map(|(_, connector)| connector)
            .ok_or_else(|| error_stack::Report::new(NoHomeForInstance))
    }

    /// Fans a read out across every registered connector (spec.md §4.2's "Read fan-out
    /// contract"): non-fatal per-connector failures (`RepositoryError`,
    /// `FunctionNotSupported`, `UserNotAuthorized`) are logged and skipped; results are merged.
    pub async fn get_entity_detail(
        &self,
        guid: InstanceGuid,
        deadline: Option<Instant>,
    ) -> Result<FederatedResult<Option<Entity>>, NoRepositories> {
        let connectors = self.registry.snapshot().await;
        if connectors.is_empty() {
            return Err(error_stack::Report::new(NoRepositories));
        }

        let mut best: Option<Entity> = None;
        let mut complete = true;
        for (_, connector) in connectors {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    complete = false;
                    break;
                }
            }
            match connector.lookup_entity(guid).await {
                Ok(crate::collection::EntityLookup::FullEntity(entity)) => {
                    best = Some(merge_by_version_key(best, *entity));
                }
                Ok(crate::collection::EntityLookup::ProxyOnly(_) | crate::collection::EntityLookup::NotFound) => {}
                Err(report) => {
                    tracing::warn!(error = ?report, "connector failed during federated read; skipping");
                }
            }
        }

        Ok(if complete {
            FederatedResult::Complete(best)
        } else {
            FederatedResult::Partial(best)
        })
    }

    /// Federated find: invokes every connector's `find_entities_by_property` and returns the
    /// union, deduplicated by GUID keeping the highest `(version, typeVersion)` per I4/I5's
    /// merge tie-break (spec.md §9's resolved Open Question). One connector failing does not
    /// fail the call (P7).
    pub async fn find_entities_by_property(
        &self,
        type_name: Option<&str>,
        property_name: &str,
        property_value: &serde_json::Value,
    ) -> Result<Vec<Entity>, NoRepositories> {
        let connectors = self.registry.snapshot().await;
        if connectors.is_empty() {
            return Err(error_stack::Report::new(NoRepositories));
        }

        let mut merged: std::collections::HashMap<InstanceGuid, Entity> = std::collections::HashMap::new();
        for (_, connector) in connectors {
            match connector
                .find_entities_by_property(type_name, property_name, property_value)
                .await
            {
                Ok(entities) => {
                    for entity in entities {
                        merged
                            .entry(entity.guid)
                            .and_modify(|existing| {
                                if entity.version_key() > existing.version_key() {
                                    *existing = entity.clone();
                                }
                            })
                            .or_insert(entity);
                    }
                }
                Err(report) => {
                    tracing::warn!(error = ?report, "connector failed during federated find; skipping");
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Routes a property update to the instance's home connector only (P8), failing with
    /// [`NoHomeForInstance`] if no registered connector matches.
    pub async fn update_entity_properties(
        &self,
        provenance: &omrs_types::provenance::Provenance,
        entity: Entity,
    ) -> Result<Entity, NoHomeForInstance> {
        let connector = self.home_connector(provenance).await?;
        connector
            .update_entity(entity)
            .await
            .change_context(NoHomeForInstance)
    }

    pub async fn get_relationship(
        &self,
        guid: InstanceGuid,
        deadline: Option<Instant>,
    ) -> Result<FederatedResult<Option<Relationship>>, NoRepositories> {
        let connectors = self.registry.snapshot().await;
        if connectors.is_empty() {
            return Err(error_stack::Report::new(NoRepositories));
        }

        let mut best: Option<Relationship> = None;
        let mut complete = true;
        for (_, connector) in connectors {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    complete = false;
                    break;
                }
            }
            match connector.get_relationship(guid).await {
                Ok(relationship) => {
                    best = Some(match best {
                        Some(existing) if existing.version_key() >= relationship.version_key() => existing,
                        _ => relationship,
                    });
                }
                Err(report) => {
                    tracing::debug!(error = ?report, "connector does not know this relationship");
                }
            }
        }

        Ok(if complete {
            FederatedResult::Complete(best)
        } else {
            FederatedResult::Partial(best)
        })
    }
}

fn merge_by_version_key(current: Option<Entity>, candidate: Entity) -> Entity {
    match current {
        Some(existing) if existing.version_key() >= candidate.version_key() => existing,
        _ => candidate,
    }
}

#[async_trait]
impl FederationListener for EnterpriseFederator {
    async fn set_local_connector(&self, _id: omrs_types::ids::MetadataCollectionId, _connector: Arc<dyn Collection>) {
        // The registry is the source of truth for connector membership; the federator always
        // reads through `ConnectorRegistry::snapshot`, so no local caching is needed here.
    }

    async fn add_remote_connector(&self, _id: omrs_types::ids::MetadataCollectionId, _connector: Arc<dyn Collection>) {}

    async fn remove_remote_connector(&self, _id: omrs_types::ids::MetadataCollectionId) {}
}
