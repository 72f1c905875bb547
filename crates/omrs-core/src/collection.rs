//! The narrow contract between the local repository wrapper (C7) and the embedded storage
//! engine. `Collection` is what a real implementation (an in-process graph database, a thin
//! remote proxy, whatever) plugs in; this core ships only the in-memory test double in
//! [`crate::test_support`].

use async_trait::async_trait;
use error_stack::Result;
use omrs_types::{entity::Entity, ids::InstanceGuid, relationship::Relationship};

use crate::error::{EntityNotKnown, RelationshipNotKnown, RepositoryError};

/// How a lookup for a single GUID resolved (spec.md §9's "Exception-for-control-flow" design
/// note): replaces the source's thrown `EntityProxyOnly` exception with an explicit result
/// variant; the wrapper only turns `ProxyOnly` into a caller-visible error when the operation
/// explicitly forbids proxies.
#[derive(Debug, Clone)]
pub enum EntityLookup {
    FullEntity(Box<Entity>),
    ProxyOnly(Box<omrs_types::entity_proxy::EntityProxy>),
    NotFound,
}

/// Whether a conflicting write should fail outright or be silently skipped, mirroring the
/// storage crate's `ConflictBehavior` for batch reference-copy ingestion (`BATCH_INSTANCES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictBehavior {
    Fail,
    Skip,
}

/// The storage engine contract the local repository wrapper delegates every operation to.
#[async_trait]
pub trait Collection: Send + Sync {
    async fn lookup_entity(&self, guid: InstanceGuid) -> Result<EntityLookup, RepositoryError>;

    async fn get_entity(&self, guid: InstanceGuid) -> Result<Entity, EntityNotKnown>;

    async fn put_entity(&self, entity: Entity, conflict_behavior: ConflictBehavior) -> Result<Entity, RepositoryError>;

    async fn update_entity(&self, entity: Entity) -> Result<Entity, RepositoryError>;

    async fn delete_entity(&self, guid: InstanceGuid) -> Result<(), RepositoryError>;

    async fn purge_entity(&self, guid: InstanceGuid) -> Result<(), RepositoryError>;

    async fn find_entities_by_property(
        &self,
        type_name: Option<&str>,
        property_name: &str,
        property_value: &serde_json::Value,
    ) -> Result<Vec<Entity>, RepositoryError>;

    async fn get_relationship(&self, guid: InstanceGuid) -> Result<Relationship, RelationshipNotKnown>;

    async fn put_relationship(
        &self,
        relationship: Relationship,
        conflict_behavior: ConflictBehavior,
    ) -> Result<Relationship, RepositoryError>;

    async fn update_relationship(&self, relationship: Relationship) -> Result<Relationship, RepositoryError>;

    async fn delete_relationship(&self, guid: InstanceGuid) -> Result<(), RepositoryError>;

    async fn purge_relationship(&self, guid: InstanceGuid) -> Result<(), RepositoryError>;

    async fn relationships_for_entity(&self, guid: InstanceGuid) -> Result<Vec<Relationship>, RepositoryError>;
}
