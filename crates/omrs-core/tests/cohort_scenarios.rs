//! End-to-end cohort scenarios (spec.md §8 S1-S5), each driving two independently-wired
//! repositories around a shared, manually-delivered `CohortEventEnvelope` stream — the way the
//! storage crate's `store/test_graph.rs` harness drives a `DatabaseTestWrapper` through a whole
//! request lifecycle rather than unit-testing one method at a time.
//!
//! There is no concrete `CohortBus` transport in this workspace (see `bus.rs`), so "delivery"
//! here is draining one repository's `InMemoryBus` and feeding the envelopes straight into the
//! other's `InstanceEventProcessor::handle_event`, which is exactly what a real transport would
//! do on the wire.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use error_stack::Result;
use omrs_core::{
    authorization::AllowAll,
    collection::{Collection, ConflictBehavior, EntityLookup},
    error::RepositoryError,
    event_processor::InstanceEventProcessor,
    federator::EnterpriseFederator,
    registry::{ConnectorRegistry, FederationListener},
    rules::TypeNameAllowList,
    test_support::{InMemoryBus, InMemoryCollection},
    validation::{BasicInstanceFactory, BasicInstanceValidator},
    wrapper::{LocalRepositoryConfig, LocalRepositoryWrapper},
};
use omrs_types::{
    ids::{AccountId, MetadataCollectionId, TypeDefGuid},
    relationship::Relationship,
    typedef::{TypeDefCategory, TypeDefSummary},
    TypeVersion,
};
use serde_json::json;

type TestWrapper = LocalRepositoryWrapper<InMemoryCollection, BasicInstanceValidator, BasicInstanceFactory>;
type TestProcessor = InstanceEventProcessor<InMemoryCollection, BasicInstanceValidator, BasicInstanceFactory>;

fn dataset_type() -> TypeDefSummary {
    TypeDefSummary::new(TypeDefGuid::generate(), "DataSet", TypeDefCategory::EntityDef, TypeVersion::new(1))
}

fn asset_type() -> TypeDefSummary {
    TypeDefSummary::new(TypeDefGuid::generate(), "Asset", TypeDefCategory::EntityDef, TypeVersion::new(1))
}

/// One cohort member: its storage, outbound bus, wrapper, and inbound event processor, all
/// wired the way `bin/omrs-server` wires a real one.
struct Repo {
    id: MetadataCollectionId,
    collection: Arc<InMemoryCollection>,
    bus: Arc<InMemoryBus>,
    wrapper: Arc<TestWrapper>,
    processor: TestProcessor,
}

impl Repo {
    fn new(name: &str) -> Self {
        let id = MetadataCollectionId::generate();
        let collection = Arc::new(InMemoryCollection::new());
        let bus = Arc::new(InMemoryBus::new());
        let emitter = Arc::new(omrs_core::bus::OutboundEventEmitter::spawn(
            bus.clone(),
            64,
            omrs_core::bus::OverflowPolicy::DropOldest,
        ));
        let wrapper = Arc::new(LocalRepositoryWrapper::new(
            collection.clone(),
            BasicInstanceValidator,
            BasicInstanceFactory,
            Some(emitter),
            LocalRepositoryConfig {
                local_metadata_collection_id: id,
                local_metadata_collection_name: name.to_owned(),
                produce_events_for_real_connector: true,
            },
        ));
        let processor = InstanceEventProcessor::new(wrapper.clone(), Arc::new(TypeNameAllowList::all()));
        Self {
            id,
            collection,
            bus,
            wrapper,
            processor,
        }
    }

    /// Drains whatever this repo has emitted and hands every envelope to `other`, mimicking a
    /// cohort message-bus delivering published events to a subscriber.
    async fn deliver_to(&self, other: &Repo) {
        settle().await;
        for envelope in self.bus.drain() {
            other.processor.handle_event(envelope).await;
        }
    }
}

fn actor() -> AccountId {
    AccountId::generate()
}

/// Gives each repo's background drain task (see `bus.rs`) a chance to move events from the
/// emitter's channel onto its `InMemoryBus` before a test drains that bus.
async fn settle() {
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}

/// S1: add, update, propagate.
#[tokio::test]
async fn add_update_and_propagate_reaches_the_peer() {
    let a = Repo::new("A");
    let b = Repo::new("B");

    let mut props = HashMap::new();
    props.insert("name".to_owned(), json!("orders"));
    let created = a
        .wrapper
        .add_entity(actor(), &AllowAll, dataset_type(), props)
        .await
        .expect("add_entity should succeed");
    assert_eq!(created.version.as_i64(), 1);

    a.deliver_to(&b).await;

    let seen = b
        .wrapper
        .peek_entity(created.guid)
        .await
        .expect("peek should succeed");
    let EntityLookup::FullEntity(seen) = seen else {
        panic!("expected B to hold a full reference copy after NEW_ENTITY");
    };
    assert_eq!(seen.properties.get("name"), Some(&json!("orders")));
    assert_eq!(seen.provenance.metadata_collection_id, a.id);

    let mut updated_props = HashMap::new();
    updated_props.insert("name".to_owned(), json!("orders_v2"));
    a.wrapper
        .update_entity_properties(actor(), &AllowAll, created.guid, updated_props)
        .await
        .expect("update should succeed");

    a.deliver_to(&b).await;

    let EntityLookup::FullEntity(updated) = b
        .wrapper
        .peek_entity(created.guid)
        .await
        .expect("peek should succeed")
    else {
        panic!("B should still hold a reference copy after the update");
    };
    assert_eq!(updated.version.as_i64(), 2);
    assert_eq!(updated.properties.get("name"), Some(&json!("orders_v2")));
}

/// S2: an out-of-order update (v3 observed before v2) drops the stale v2 per P3.
#[tokio::test]
async fn out_of_order_update_drops_the_stale_version() {
    let a = Repo::new("A");
    let b = Repo::new("B");

    let mut props = HashMap::new();
    props.insert("name".to_owned(), json!("v1"));
    let entity = a
        .wrapper
        .add_entity(actor(), &AllowAll, dataset_type(), props)
        .await
        .expect("add_entity should succeed");
    a.deliver_to(&b).await;

    let mut v2_props = HashMap::new();
    v2_props.insert("name".to_owned(), json!("v2"));
    a.wrapper
        .update_entity_properties(actor(), &AllowAll, entity.guid, v2_props)
        .await
        .expect("update to v2 should succeed");
    settle().await;
    let v2_envelopes = a.bus.drain();

    let mut v3_props = HashMap::new();
    v3_props.insert("name".to_owned(), json!("v3"));
    a.wrapper
        .update_entity_properties(actor(), &AllowAll, entity.guid, v3_props)
        .await
        .expect("update to v3 should succeed");
    settle().await;
    let v3_envelopes = a.bus.drain();

    // Deliver v3 first, then the stale v2.
    for envelope in v3_envelopes {
        b.processor.handle_event(envelope).await;
    }
    for envelope in v2_envelopes {
        b.processor.handle_event(envelope).await;
    }

    let EntityLookup::FullEntity(final_state) = b
        .wrapper
        .peek_entity(entity.guid)
        .await
        .expect("peek should succeed")
    else {
        panic!("B should hold a reference copy");
    };
    assert_eq!(final_state.version.as_i64(), 3);
    assert_eq!(final_state.properties.get("name"), Some(&json!("v3")));
}

/// S3: a GUID collision. A holds "g3" locally; B independently learns of an instance claiming
/// the same GUID with a different `createTime` and publishes it. A detects the mismatch,
/// refuses to overwrite its own instance, and raises CONFLICTING_INSTANCES targeted at B; B then
/// re-identifies its own (colliding) copy to a fresh GUID.
#[tokio::test]
async fn guid_collision_targets_the_intruder_for_reidentification() {
    let a = Repo::new("A");
    let b = Repo::new("B");

    let mut props = HashMap::new();
    props.insert("name".to_owned(), json!("a-owned"));
    let a_entity = a
        .wrapper
        .add_entity(actor(), &AllowAll, dataset_type(), props)
        .await
        .expect("A should create its own entity");

    // B independently ends up with an entity claiming the exact same GUID, homed at B, but
    // with a different createTime — the GUID-collision precondition (I1 violated upstream).
    let mut colliding = a_entity.clone();
    colliding.provenance = omrs_types::provenance::Provenance::local(b.id, "B".to_owned());
    colliding.create_time = omrs_types::timestamp::InstanceTimestamp::UNIX_EPOCH;
    colliding.update_time = colliding.create_time;
    b.collection
        .put_entity(colliding.clone(), ConflictBehavior::Skip)
        .await
        .expect("seeding B's colliding entity should succeed");

    // B announces it as if it had just been created there.
    let envelope = omrs_types::events::CohortEventEnvelope::new(
        omrs_types::events::CohortEventType::NewEntity,
        omrs_types::events::Originator {
            metadata_collection_id: b.id,
            server_name: "B".to_owned(),
            server_type: "Repository".to_owned(),
            organization_name: String::new(),
        },
    )
    .with_entity(colliding.clone());
    a.processor.handle_event(envelope).await;

    // A's own copy is untouched, and A has raised a CONFLICTING_INSTANCES event.
    let EntityLookup::FullEntity(still_a) = a
        .wrapper
        .peek_entity(a_entity.guid)
        .await
        .expect("peek should succeed")
    else {
        panic!("A should still hold its own entity");
    };
    assert_eq!(still_a.properties.get("name"), Some(&json!("a-owned")));
    assert_eq!(still_a.provenance.metadata_collection_id, a.id);

    settle().await;
    let conflict_events = a.bus.drain();
    let conflict = conflict_events
        .into_iter()
        .find(|e| e.event_type == omrs_types::events::CohortEventType::ConflictingInstances)
        .expect("A should have raised CONFLICTING_INSTANCES");
    assert_eq!(conflict.target_metadata_collection_id, Some(b.id));

    // Delivered to B, this re-identifies B's colliding copy under a fresh GUID.
    b.processor.handle_event(conflict).await;

    settle().await;
    let reidentified = b.bus.drain();
    let reidentify_event = reidentified
        .into_iter()
        .find(|e| e.event_type == omrs_types::events::CohortEventType::ReIdentifiedEntity)
        .expect("B should emit RE_IDENTIFIED_ENTITY after resolving the collision");
    assert_eq!(reidentify_event.original_instance_guid, Some(a_entity.guid));
    let new_entity = reidentify_event.entity.expect("re-identified entity should be attached");
    assert_ne!(new_entity.guid, a_entity.guid);

    assert!(matches!(
        b.wrapper.peek_entity(a_entity.guid).await.expect("peek should succeed"),
        EntityLookup::NotFound
    ));
}

struct NullListener;

#[async_trait]
impl FederationListener for NullListener {
    async fn set_local_connector(&self, _id: MetadataCollectionId, _connector: Arc<dyn Collection>) {}
    async fn add_remote_connector(&self, _id: MetadataCollectionId, _connector: Arc<dyn Collection>) {}
    async fn remove_remote_connector(&self, _id: MetadataCollectionId) {}
}

/// S4: federated find returns the union across every connector, without duplicates.
#[tokio::test]
async fn federated_find_returns_union_across_both_repositories() {
    let a = Repo::new("A");
    let b = Repo::new("B");

    let mut props = HashMap::new();
    props.insert("kind".to_owned(), json!("match"));
    a.wrapper
        .add_entity(actor(), &AllowAll, asset_type(), props.clone())
        .await
        .expect("A should create o1");
    b.wrapper
        .add_entity(actor(), &AllowAll, asset_type(), props)
        .await
        .expect("B should create o2");

    let registry = Arc::new(ConnectorRegistry::new());
    let federator = EnterpriseFederator::new(registry.clone(), Arc::new(NullListener)).await;
    registry.set_local_connector(a.id, a.collection.clone()).await;
    registry.add_remote_connector(b.id, b.collection.clone()).await;

    let found = federator
        .find_entities_by_property(Some("Asset"), "kind", &json!("match"))
        .await
        .expect("federated find should succeed");
    assert_eq!(found.len(), 2);
}

/// A `Collection` that always fails reads, standing in for a cohort member whose connector has
/// gone down mid-session (S5).
struct FailingCollection {
    inner: Arc<InMemoryCollection>,
}

#[async_trait]
impl Collection for FailingCollection {
    async fn lookup_entity(
        &self,
        guid: omrs_types::ids::InstanceGuid,
    ) -> Result<EntityLookup, RepositoryError> {
        let _ = guid;
        Err(error_stack::Report::new(RepositoryError).attach_printable("connector unreachable"))
    }

    async fn get_entity(&self, guid: omrs_types::ids::InstanceGuid) -> Result<omrs_types::entity::Entity, omrs_core::error::EntityNotKnown> {
        self.inner.get_entity(guid).await
    }

    async fn put_entity(
        &self,
        entity: omrs_types::entity::Entity,
        conflict_behavior: ConflictBehavior,
    ) -> Result<omrs_types::entity::Entity, RepositoryError> {
        self.inner.put_entity(entity, conflict_behavior).await
    }

    async fn update_entity(&self, entity: omrs_types::entity::Entity) -> Result<omrs_types::entity::Entity, RepositoryError> {
        self.inner.update_entity(entity).await
    }

    async fn delete_entity(&self, guid: omrs_types::ids::InstanceGuid) -> Result<(), RepositoryError> {
        self.inner.delete_entity(guid).await
    }

    async fn purge_entity(&self, guid: omrs_types::ids::InstanceGuid) -> Result<(), RepositoryError> {
        self.inner.purge_entity(guid).await
    }

    async fn find_entities_by_property(
        &self,
        type_name: Option<&str>,
        property_name: &str,
        property_value: &serde_json::Value,
    ) -> Result<Vec<omrs_types::entity::Entity>, RepositoryError> {
        let _ = (type_name, property_name, property_value);
        Err(error_stack::Report::new(RepositoryError).attach_printable("connector unreachable"))
    }

    async fn get_relationship(
        &self,
        guid: omrs_types::ids::InstanceGuid,
    ) -> Result<Relationship, omrs_core::error::RelationshipNotKnown> {
        self.inner.get_relationship(guid).await
    }

    async fn put_relationship(
        &self,
        relationship: Relationship,
        conflict_behavior: ConflictBehavior,
    ) -> Result<Relationship, RepositoryError> {
        self.inner.put_relationship(relationship, conflict_behavior).await
    }

    async fn update_relationship(&self, relationship: Relationship) -> Result<Relationship, RepositoryError> {
        self.inner.update_relationship(relationship).await
    }

    async fn delete_relationship(&self, guid: omrs_types::ids::InstanceGuid) -> Result<(), RepositoryError> {
        self.inner.delete_relationship(guid).await
    }

    async fn purge_relationship(&self, guid: omrs_types::ids::InstanceGuid) -> Result<(), RepositoryError> {
        self.inner.purge_relationship(guid).await
    }

    async fn relationships_for_entity(&self, guid: omrs_types::ids::InstanceGuid) -> Result<Vec<Relationship>, RepositoryError> {
        self.inner.relationships_for_entity(guid).await
    }
}

/// S5: one connector failing every read does not fail the federated call, and the other
/// connector's results still come back (P7).
#[tokio::test]
async fn federated_find_tolerates_one_connector_going_down() {
    let a = Repo::new("A");
    let b = Repo::new("B");

    let mut props = HashMap::new();
    props.insert("kind".to_owned(), json!("match"));
    a.wrapper
        .add_entity(actor(), &AllowAll, asset_type(), props.clone())
        .await
        .expect("A should create o1");
    b.wrapper
        .add_entity(actor(), &AllowAll, asset_type(), props)
        .await
        .expect("B should create o2 before going down");

    let registry = Arc::new(ConnectorRegistry::new());
    let federator = EnterpriseFederator::new(registry.clone(), Arc::new(NullListener)).await;
    registry.set_local_connector(a.id, a.collection.clone()).await;
    registry
        .add_remote_connector(b.id, Arc::new(FailingCollection { inner: b.collection.clone() }))
        .await;

    let found = federator
        .find_entities_by_property(Some("Asset"), "kind", &json!("match"))
        .await
        .expect("federated find should not fail just because one connector errored");
    assert_eq!(found.len(), 1);
}
