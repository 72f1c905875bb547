//! In-memory [`Collection`] and [`CohortBus`] stand-ins used by this crate's own tests and
//! available to downstream crates under the `test-util` feature, in the style of the storage
//! crate's `store/test_graph.rs` in-memory test harness.
//!
//! Internally synchronized with `std::sync::Mutex` (short, non-blocking critical sections; no
//! `.await` under the lock), matching spec.md §5's guidance for in-memory test stores.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use error_stack::Result;
use omrs_types::{entity::Entity, events::CohortEventEnvelope, ids::InstanceGuid, relationship::Relationship};

use crate::{
    bus::CohortBus,
    collection::{Collection, ConflictBehavior, EntityLookup},
    error::{EntityNotKnown, RelationshipNotKnown, RepositoryError},
};

/// A plain in-memory [`Collection`], good enough to drive the reference-copy and federation
/// scenarios (S1-S6) without a real storage engine.
#[derive(Default)]
pub struct InMemoryCollection {
    entities: Mutex<HashMap<InstanceGuid, Entity>>,
    relationships: Mutex<HashMap<InstanceGuid, Relationship>>,
}

impl InMemoryCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn seed_entity(self, entity: Entity) -> Self {
        self.entities.lock().expect("lock poisoned").insert(entity.guid, entity);
        self
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    async fn lookup_entity(&self, guid: InstanceGuid) -> Result<EntityLookup, RepositoryError> {
        let entities = self.entities.lock().expect("lock poisoned");
        Ok(match entities.get(&guid) {
            Some(entity) => EntityLookup::FullEntity(Box::new(entity.clone())),
            None => EntityLookup::NotFound,
        })
    }

    async fn get_entity(&self, guid: InstanceGuid) -> Result<Entity, EntityNotKnown> {
        self.entities
            .lock()
            .expect("lock poisoned")
            .get(&guid)
            .cloned()
            .ok_or_else(|| error_stack::Report::new(EntityNotKnown))
    }

    async fn put_entity(&self, entity: Entity, conflict_behavior: ConflictBehavior) -> Result<Entity, RepositoryError> {
        let mut entities = self.entities.lock().expect("lock poisoned");
        if entities.contains_key(&entity.guid) && conflict_behavior == ConflictBehavior::Fail {
            return Err(error_stack::Report::new(RepositoryError).attach_printable("GUID already exists"));
        }
        entities.insert(entity.guid, entity.clone());
        Ok(entity)
    }

    async fn update_entity(&self, entity: Entity) -> Result<Entity, RepositoryError> {
        let mut entities = self.entities.lock().expect("lock poisoned");
        entities.insert(entity.guid, entity.clone());
        Ok(entity)
    }

    async fn delete_entity(&self, guid: InstanceGuid) -> Result<(), RepositoryError> {
        // Soft-delete is modeled as an `update_entity` call by the wrapper; this method exists
        // for storage engines that model it separately.
        self.entities
            .lock()
            .expect("lock poisoned")
            .get(&guid)
            .map(|_| ())
            .ok_or_else(|| error_stack::Report::new(RepositoryError).attach_printable("entity not known"))
    }

    async fn purge_entity(&self, guid: InstanceGuid) -> Result<(), RepositoryError> {
        self.entities.lock().expect("lock poisoned").remove(&guid);
        Ok(())
    }

    async fn find_entities_by_property(
        &self,
        type_name: Option<&str>,
        property_name: &str,
        property_value: &serde_json::Value,
    ) -> Result<Vec<Entity>, RepositoryError> {
        let entities = self.entities.lock().expect("lock poisoned");
        Ok(entities
            .values()
            .filter(|entity| type_name.map_or(true, |name| entity.entity_type.name == name))
            .filter(|entity| entity.properties.get(property_name) == Some(property_value))
            .cloned()
            .collect())
    }

    async fn get_relationship(&self, guid: InstanceGuid) -> Result<Relationship, RelationshipNotKnown> {
        self.relationships
            .lock()
            .expect("lock poisoned")
            .get(&guid)
            .cloned()
            .ok_or_else(|| error_stack::Report::new(RelationshipNotKnown))
    }

    async fn put_relationship(
        &self,
        relationship: Relationship,
        conflict_behavior: ConflictBehavior,
    ) -> Result<Relationship, RepositoryError> {
        let mut relationships = self.relationships.lock().expect("lock poisoned");
        if relationships.contains_key(&relationship.guid) && conflict_behavior == ConflictBehavior::Fail {
            return Err(error_stack::Report::new(RepositoryError).attach_printable("GUID already exists"));
        }
        relationships.insert(relationship.guid, relationship.clone());
        Ok(relationship)
    }

    async fn update_relationship(&self, relationship: Relationship) -> Result<Relationship, RepositoryError> {
        let mut relationships = self.relationships.lock().expect("lock poisoned");
        relationships.insert(relationship.guid, relationship.clone());
        Ok(relationship)
    }

    async fn delete_relationship(&self, guid: InstanceGuid) -> Result<(), RepositoryError> {
        self.relationships
            .lock()
            .expect("lock poisoned")
            .get(&guid)
            .map(|_| ())
            .ok_or_else(|| error_stack::Report::new(RepositoryError).attach_printable("relationship not known"))
    }

    async fn purge_relationship(&self, guid: InstanceGuid) -> Result<(), RepositoryError> {
        self.relationships.lock().expect("lock poisoned").remove(&guid);
        Ok(())
    }

    async fn relationships_for_entity(&self, guid: InstanceGuid) -> Result<Vec<Relationship>, RepositoryError> {
        let relationships = self.relationships.lock().expect("lock poisoned");
        Ok(relationships
            .values()
            .filter(|relationship| relationship.end_one.guid == guid || relationship.end_two.guid == guid)
            .cloned()
            .collect())
    }
}

/// A [`CohortBus`] that records every published envelope in-process, for assertions in tests
/// that wire two [`crate::wrapper::LocalRepositoryWrapper`]s together to simulate a cohort.
#[derive(Default)]
pub struct InMemoryBus {
    published: Mutex<Vec<CohortEventEnvelope>>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn drain(&self) -> Vec<CohortEventEnvelope> {
        std::mem::take(&mut self.published.lock().expect("lock poisoned"))
    }
}

#[async_trait]
impl CohortBus for InMemoryBus {
    async fn publish(&self, envelope: CohortEventEnvelope) -> Result<(), RepositoryError> {
        self.published.lock().expect("lock poisoned").push(envelope);
        Ok(())
    }
}
