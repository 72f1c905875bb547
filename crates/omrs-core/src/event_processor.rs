//! Instance event processor (C8): reacts to inbound cohort events, turning them into
//! reference-copy updates and driving conflict resolution (spec.md §4.3).
//!
//! `handle_event` never returns a `Result`: per the error-handling design ("the event processor
//! never propagates errors to callers; it audits and drops"), a failure handling one event is
//! logged and the event is dropped, and subsequent events keep flowing — matching the
//! "Failure isolation" rule in spec.md §5.

use std::sync::Arc;

use async_trait::async_trait;
use error_stack::{Result, ResultExt};
use omrs_types::{
    entity::Entity,
    events::{CohortEventEnvelope, CohortEventType, InstanceGraph},
    relationship::Relationship,
};

use crate::{
    collection::{Collection, EntityLookup},
    error::LogicError,
    rules::{ExchangeRule, TypeNamed},
    validation::{InstanceFactory, InstanceValidator},
    wrapper::LocalRepositoryWrapper,
};

/// Separate from [`InstanceEventProcessor`]'s inbound-event handling so [`crate::federator::EnterpriseFederator`]
/// depends only on the narrower trait it actually needs (spec.md §4.3's "retrieval sub-interface"),
/// mirroring the teacher's habit of splitting store traits by concern rather than one mega-trait.
#[async_trait]
pub trait RetrievalEventProcessor: Send + Sync {
    /// After a federated read surfaces an entity summary, decide whether to proactively learn it.
    async fn process_retrieved_entity_summary(&self, entity: &Entity);
    /// Same decision for a full entity detail.
    async fn process_retrieved_entity_detail(&self, entity: &Entity);
    /// Same decision for a relationship.
    async fn process_retrieved_relationship(&self, relationship: &Relationship);
}

/// Reacts to inbound cohort events (spec.md §4.3, C8): dispatches on [`CohortEventType`],
/// applies the reference-copy compare-and-validate protocol, and resolves GUID-collision and
/// conflicting-type anomalies.
pub struct InstanceEventProcessor<C, V, F> {
    wrapper: Arc<LocalRepositoryWrapper<C, V, F>>,
    exchange_rule: Arc<dyn ExchangeRule>,
}

impl<C, V, F> InstanceEventProcessor<C, V, F>
where
    C: Collection,
    V: InstanceValidator,
    F: InstanceFactory,
{
    #[must_use]
    pub fn new(wrapper: Arc<LocalRepositoryWrapper<C, V, F>>, exchange_rule: Arc<dyn ExchangeRule>) -> Self {
        Self { wrapper, exchange_rule }
    }

    /// Top-level dispatch (spec.md §4.3's event table). Never fails the caller: a failure
    /// handling one event is logged and the event dropped, never halting the stream.
    #[tracing::instrument(skip(self, envelope), fields(event_type = ?envelope.event_type))]
    pub async fn handle_event(&self, envelope: CohortEventEnvelope) {
        let event_type = envelope.event_type;
        let outcome = match event_type {
            CohortEventType::NewEntity
            | CohortEventType::UpdatedEntity
            | CohortEventType::UndoneEntity
            | CohortEventType::ClassifiedEntity
            | CohortEventType::ReclassifiedEntity
            | CohortEventType::DeclassifiedEntity
            | CohortEventType::DeletedEntity
            | CohortEventType::RestoredEntity
            | CohortEventType::ReIdentifiedEntity
            | CohortEventType::ReTypedEntity
            | CohortEventType::ReHomedEntity
            | CohortEventType::RefreshedEntity => match envelope.entity {
                Some(entity) => self.update_reference_entity(entity).await,
                None => {
                    tracing::warn!("entity event carried no entity payload; dropping");
                    Ok(())
                }
            },
            CohortEventType::NewRelationship
            | CohortEventType::UpdatedRelationship
            | CohortEventType::UndoneRelationship
            | CohortEventType::DeletedRelationship
            | CohortEventType::RestoredRelationship
            | CohortEventType::ReIdentifiedRelationship
            | CohortEventType::ReTypedRelationship
            | CohortEventType::ReHomedRelationship
            | CohortEventType::RefreshedRelationship => match envelope.relationship {
                Some(relationship) => self.update_reference_relationship(relationship).await,
                None => {
                    tracing::warn!("relationship event carried no relationship payload; dropping");
                    Ok(())
                }
            },
            CohortEventType::PurgedEntity => {
                if let Some(guid) = envelope.instance_guid {
                    self.wrapper
                        .purge_entity_reference_copy(guid)
                        .await
                        .attach_printable("purging entity reference copy on PURGED_ENTITY")
                } else {
                    tracing::warn!("PURGED_ENTITY carried no instance GUID; dropping");
                    Ok(())
                }
            }
            CohortEventType::PurgedRelationship => {
                if let Some(guid) = envelope.instance_guid {
                    self.wrapper
                        .purge_relationship_reference_copy(guid)
                        .await
                        .attach_printable("purging relationship reference copy on PURGED_RELATIONSHIP")
                } else {
                    tracing::warn!("PURGED_RELATIONSHIP carried no instance GUID; dropping");
                    Ok(())
                }
            }
            CohortEventType::RefreshEntityRequest => {
                if let (Some(guid), Some(home)) = (envelope.instance_guid, envelope.home_metadata_collection_id) {
                    self.wrapper.answer_refresh_request(guid, home).await;
                }
                Ok(())
            }
            CohortEventType::RefreshRelationshipRequest => {
                if let (Some(guid), Some(home)) = (envelope.instance_guid, envelope.home_metadata_collection_id) {
                    self.wrapper.answer_relationship_refresh_request(guid, home).await;
                }
                Ok(())
            }
            CohortEventType::BatchInstances => {
                if let Some(graph) = envelope.instance_batch {
                    self.save_instance_reference_copies(graph).await;
                } else {
                    tracing::warn!("BATCH_INSTANCES carried no instance graph; dropping");
                }
                Ok(())
            }
            CohortEventType::ConflictingInstances => {
                self.handle_conflicting_instances(&envelope).await;
                Ok(())
            }
            CohortEventType::ConflictingType => {
                self.handle_conflicting_type(&envelope).await;
                Ok(())
            }
        };

        if let Err(report) = outcome {
            tracing::error!(error = ?report, ?event_type, "failed to process inbound cohort event; dropping");
        }
    }

    /// `updateReferenceEntity` (spec.md §4.3): validates, compares against the stored copy, and
    /// either stores a reference copy, drops a stale update, or raises a conflict.
    async fn update_reference_entity(&self, incoming: Entity) -> Result<(), LogicError> {
        if incoming.provenance.metadata_collection_id == self.wrapper.local_metadata_collection_id() {
            tracing::warn!(guid = %incoming.guid, "refusing to learn an instance homed locally (I2)");
            return Ok(());
        }
        self.wrapper
            .validator()
            .validate_entity(&incoming)
            .change_context(LogicError)
            .attach_printable("inbound entity failed structural validation")?;

        let stored = match self
            .wrapper
            .peek_entity(incoming.guid)
            .await
            .change_context(LogicError)?
        {
            EntityLookup::FullEntity(entity) => Some(*entity),
            EntityLookup::ProxyOnly(_) | EntityLookup::NotFound => None,
        };

        match stored {
            None => self.accept_entity(incoming).await,
            Some(stored) if stored.create_time != incoming.create_time => {
                self.raise_guid_collision_entity(&stored, &incoming).await;
                Ok(())
            }
            Some(stored) if incoming.version <= stored.version => {
                tracing::debug!(guid = %incoming.guid, "dropping out-of-order entity update (P3)");
                Ok(())
            }
            Some(stored) if incoming.entity_type.version < stored.entity_type.version => {
                self.raise_conflicting_type_entity(&stored, &incoming).await;
                Ok(())
            }
            Some(stored) => {
                if stored.provenance.metadata_collection_id != incoming.provenance.metadata_collection_id
                    || stored.entity_type.guid != incoming.entity_type.guid
                {
                    tracing::info!(
                        guid = %incoming.guid,
                        old_home = %stored.provenance.metadata_collection_id,
                        new_home = %incoming.provenance.metadata_collection_id,
                        "accepted reference copy changed home or type"
                    );
                }
                self.accept_entity(incoming).await
            }
        }
    }

    async fn accept_entity(&self, incoming: Entity) -> Result<(), LogicError> {
        if !self.exchange_rule.process_instance_event(incoming.type_name()) {
            tracing::debug!(guid = %incoming.guid, "exchange rule declined to save this reference copy");
            return Ok(());
        }
        self.wrapper.save_entity_reference_copy(incoming).await?;
        Ok(())
    }

    async fn raise_guid_collision_entity(&self, stored: &Entity, incoming: &Entity) {
        tracing::warn!(
            guid = %incoming.guid,
            stored_home = %stored.provenance.metadata_collection_id,
            incoming_home = %incoming.provenance.metadata_collection_id,
            "GUID collision: createTime mismatch between stored and incoming entity"
        );
        let mut envelope = self.wrapper.make_envelope(CohortEventType::ConflictingInstances);
        envelope.target_metadata_collection_id = Some(incoming.provenance.metadata_collection_id);
        envelope.target_instance_guid = Some(incoming.guid);
        envelope.target_type_def_summary = Some(incoming.entity_type.clone());
        envelope.other_metadata_collection_id = Some(stored.provenance.metadata_collection_id);
        envelope.other_instance_guid = Some(stored.guid);
        envelope.other_type_def_summary = Some(stored.entity_type.clone());
        envelope.original_entity = Some(stored.clone());
        envelope.entity = Some(incoming.clone());
        self.wrapper.emit_envelope(envelope).await;
    }

    async fn raise_conflicting_type_entity(&self, stored: &Entity, incoming: &Entity) {
        tracing::warn!(
            guid = %incoming.guid,
            stored_type_version = %stored.entity_type.version,
            incoming_type_version = %incoming.entity_type.version,
            "type-version regression on inbound entity update (I5)"
        );
        let mut envelope = self.wrapper.make_envelope(CohortEventType::ConflictingType);
        envelope.instance_guid = Some(incoming.guid);
        envelope.target_type_def_summary = Some(stored.entity_type.clone());
        envelope.other_type_def_summary = Some(incoming.entity_type.clone());
        envelope.entity = Some(incoming.clone());
        self.wrapper.emit_envelope(envelope).await;
    }

    /// `updateReferenceRelationship`, the symmetric relationship path.
    async fn update_reference_relationship(&self, incoming: Relationship) -> Result<(), LogicError> {
        if incoming.provenance.metadata_collection_id == self.wrapper.local_metadata_collection_id() {
            tracing::warn!(guid = %incoming.guid, "refusing to learn a relationship homed locally (I2)");
            return Ok(());
        }
        self.wrapper
            .validator()
            .validate_relationship(&incoming)
            .change_context(LogicError)
            .attach_printable("inbound relationship failed structural validation")?;

        let stored = self.wrapper.peek_relationship(incoming.guid).await.change_context(LogicError)?;

        match stored {
            None => self.accept_relationship(incoming).await,
            Some(stored) if stored.create_time != incoming.create_time => {
                self.raise_guid_collision_relationship(&stored, &incoming).await;
                Ok(())
            }
            Some(stored) if incoming.version <= stored.version => {
                tracing::debug!(guid = %incoming.guid, "dropping out-of-order relationship update (P3)");
                Ok(())
            }
            Some(stored) if incoming.relationship_type.version < stored.relationship_type.version => {
                self.raise_conflicting_type_relationship(&stored, &incoming).await;
                Ok(())
            }
            Some(_) => self.accept_relationship(incoming).await,
        }
    }

    async fn accept_relationship(&self, incoming: Relationship) -> Result<(), LogicError> {
        if !self.exchange_rule.process_instance_event(incoming.type_name()) {
            tracing::debug!(guid = %incoming.guid, "exchange rule declined to save this reference copy");
            return Ok(());
        }
        self.wrapper.save_relationship_reference_copy(incoming).await?;
        Ok(())
    }

    async fn raise_guid_collision_relationship(&self, stored: &Relationship, incoming: &Relationship) {
        tracing::warn!(guid = %incoming.guid, "GUID collision: createTime mismatch between stored and incoming relationship");
        let mut envelope = self.wrapper.make_envelope(CohortEventType::ConflictingInstances);
        envelope.target_metadata_collection_id = Some(incoming.provenance.metadata_collection_id);
        envelope.target_instance_guid = Some(incoming.guid);
        envelope.other_metadata_collection_id = Some(stored.provenance.metadata_collection_id);
        envelope.other_instance_guid = Some(stored.guid);
        envelope.original_relationship = Some(stored.clone());
        envelope.relationship = Some(incoming.clone());
        self.wrapper.emit_envelope(envelope).await;
    }

    async fn raise_conflicting_type_relationship(&self, stored: &Relationship, incoming: &Relationship) {
        tracing::warn!(guid = %incoming.guid, "type-version regression on inbound relationship update (I5)");
        let mut envelope = self.wrapper.make_envelope(CohortEventType::ConflictingType);
        envelope.instance_guid = Some(incoming.guid);
        envelope.target_type_def_summary = Some(stored.relationship_type.clone());
        envelope.other_type_def_summary = Some(incoming.relationship_type.clone());
        envelope.relationship = Some(incoming.clone());
        self.wrapper.emit_envelope(envelope).await;
    }

    /// `saveInstanceReferenceCopies`: `BATCH_INSTANCES` delegates one-by-one through the same
    /// compare-and-validate path as individual events, per connector.
    async fn save_instance_reference_copies(&self, graph: InstanceGraph) {
        for entity in graph.entities {
            if let Err(report) = self.update_reference_entity(entity).await {
                tracing::error!(error = ?report, "failed to process one entity in a BATCH_INSTANCES graph");
            }
        }
        for relationship in graph.relationships {
            if let Err(report) = self.update_reference_relationship(relationship).await {
                tracing::error!(error = ?report, "failed to process one relationship in a BATCH_INSTANCES graph");
            }
        }
    }

    /// `CONFLICTING_INSTANCES` handling (spec.md §4.3): if we are the named target, re-identify
    /// our own locally-homed instance; otherwise purge whatever reference copy we hold for the
    /// target GUID.
    async fn handle_conflicting_instances(&self, envelope: &CohortEventEnvelope) {
        let Some(target_guid) = envelope.target_instance_guid else {
            tracing::warn!("CONFLICTING_INSTANCES carried no target instance GUID; dropping");
            return;
        };
        let targets_us = envelope.target_metadata_collection_id == Some(self.wrapper.local_metadata_collection_id());

        if envelope.relationship.is_some() || envelope.original_relationship.is_some() {
            if targets_us {
                tracing::warn!(guid = %target_guid, "re-identifying our own relationship after a GUID collision");
                // Relationship re-identification requires authorization context this internal
                // path does not have; callers are expected to recreate the relationship under a
                // fresh GUID via the ordinary write surface. We only clear our own record.
                if let Err(report) = self.wrapper.purge_relationship_reference_copy(target_guid).await {
                    tracing::error!(error = ?report, "failed to clear conflicting relationship record");
                }
            } else if let Err(report) = self.wrapper.purge_relationship_reference_copy(target_guid).await {
                tracing::error!(error = ?report, "failed to purge conflicting relationship reference copy");
            }
            return;
        }

        if targets_us {
            match self.wrapper.peek_entity(target_guid).await {
                Ok(EntityLookup::FullEntity(entity)) => {
                    if let Err(report) = self.wrapper.reidentify_local_entity(*entity).await {
                        tracing::error!(error = ?report, "failed to re-identify our own entity after a GUID collision");
                    }
                }
                Ok(EntityLookup::ProxyOnly(_) | EntityLookup::NotFound) => {
                    tracing::warn!(guid = %target_guid, "CONFLICTING_INSTANCES named us but the instance isn't known locally");
                }
                Err(report) => {
                    tracing::error!(error = ?report, "failed to look up our own entity during conflict resolution");
                }
            }
        } else if let Err(report) = self.wrapper.purge_entity_reference_copy(target_guid).await {
            tracing::error!(error = ?report, "failed to purge conflicting entity reference copy");
        }
    }

    /// `CONFLICTING_TYPE` handling: audit, and drop any reference copy we hold that isn't ours.
    async fn handle_conflicting_type(&self, envelope: &CohortEventEnvelope) {
        let Some(guid) = envelope.instance_guid else {
            tracing::warn!("CONFLICTING_TYPE carried no instance GUID; dropping");
            return;
        };
        tracing::warn!(guid = %guid, originator = ?envelope.originator, "CONFLICTING_TYPE reported by cohort peer");

        if envelope.relationship.is_some() {
            if let Ok(Some(relationship)) = self.wrapper.peek_relationship(guid).await {
                if relationship.provenance.metadata_collection_id != self.wrapper.local_metadata_collection_id() {
                    if let Err(report) = self.wrapper.purge_relationship_reference_copy(guid).await {
                        tracing::error!(error = ?report, "failed to purge relationship after CONFLICTING_TYPE");
                    }
                }
            }
            return;
        }

        if let Ok(EntityLookup::FullEntity(entity)) = self.wrapper.peek_entity(guid).await {
            if entity.provenance.metadata_collection_id != self.wrapper.local_metadata_collection_id() {
                if let Err(report) = self.wrapper.purge_entity_reference_copy(guid).await {
                    tracing::error!(error = ?report, "failed to purge entity after CONFLICTING_TYPE");
                }
            }
        }
    }
}

#[async_trait]
impl<C, V, F> RetrievalEventProcessor for InstanceEventProcessor<C, V, F>
where
    C: Collection,
    V: InstanceValidator,
    F: InstanceFactory,
{
    /// `processRetrievedEntitySummary`: the weaker `learnInstanceEvent` rule governs this path;
    /// on permission and an unknown local GUID, requests a refresh from home rather than
    /// learning the (possibly security-filtered) retrieved view directly.
    async fn process_retrieved_entity_summary(&self, entity: &Entity) {
        self.maybe_request_entity_refresh(entity).await;
    }

    async fn process_retrieved_entity_detail(&self, entity: &Entity) {
        self.maybe_request_entity_refresh(entity).await;
    }

    async fn process_retrieved_relationship(&self, relationship: &Relationship) {
        if relationship.provenance.metadata_collection_id == self.wrapper.local_metadata_collection_id() {
            return;
        }
        if !self.exchange_rule.learn_instance_event(relationship.type_name()) {
            return;
        }
        if matches!(self.wrapper.peek_relationship(relationship.guid).await, Ok(Some(_))) {
            return;
        }
        self.wrapper
            .request_relationship_refresh(relationship.guid, relationship.provenance.routing_home())
            .await;
    }
}

impl<C, V, F> InstanceEventProcessor<C, V, F>
where
    C: Collection,
    V: InstanceValidator,
    F: InstanceFactory,
{
    async fn maybe_request_entity_refresh(&self, entity: &Entity) {
        if entity.provenance.metadata_collection_id == self.wrapper.local_metadata_collection_id() {
            return;
        }
        if !self.exchange_rule.learn_instance_event(entity.type_name()) {
            return;
        }
        let known = matches!(self.wrapper.peek_entity(entity.guid).await, Ok(EntityLookup::FullEntity(_)));
        if known {
            return;
        }
        self.wrapper
            .request_entity_refresh(entity.guid, entity.provenance.routing_home())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use omrs_types::{
        ids::{InstanceGuid, MetadataCollectionId, TypeDefGuid},
        provenance::Provenance,
        status::InstanceStatus,
        timestamp::{InstanceTimestamp, InstanceVersion},
        typedef::{TypeDefCategory, TypeDefSummary},
        TypeVersion,
    };

    use super::*;
    use crate::{
        rules::TypeNameAllowList,
        test_support::{InMemoryBus, InMemoryCollection},
        validation::{BasicInstanceFactory, BasicInstanceValidator},
        wrapper::LocalRepositoryConfig,
    };

    fn sample_type() -> TypeDefSummary {
        TypeDefSummary::new(TypeDefGuid::generate(), "DataSet", TypeDefCategory::EntityDef, TypeVersion::new(1))
    }

    fn remote_entity(home: MetadataCollectionId, guid: InstanceGuid, version: i64, create_time: InstanceTimestamp) -> Entity {
        Entity {
            guid,
            entity_type: sample_type(),
            status: InstanceStatus::Active,
            version: InstanceVersion::new(version),
            create_time,
            update_time: create_time,
            provenance: Provenance::local(home, "remote".to_owned()),
            properties: HashMap::new(),
            classifications: Vec::new(),
        }
    }

    fn processor_with_local_entity(
        local_id: MetadataCollectionId,
        local_entity: Option<Entity>,
    ) -> InstanceEventProcessor<InMemoryCollection, BasicInstanceValidator, BasicInstanceFactory> {
        let mut collection = InMemoryCollection::new();
        if let Some(entity) = local_entity {
            collection = collection.seed_entity(entity);
        }
        let wrapper = Arc::new(LocalRepositoryWrapper::new(
            Arc::new(collection),
            BasicInstanceValidator,
            BasicInstanceFactory,
            None,
            LocalRepositoryConfig {
                local_metadata_collection_id: local_id,
                local_metadata_collection_name: "local".to_owned(),
                produce_events_for_real_connector: true,
            },
        ));
        InstanceEventProcessor::new(wrapper, Arc::new(TypeNameAllowList::all()))
    }

    #[tokio::test]
    async fn first_sighting_of_a_guid_is_accepted_as_a_reference_copy() {
        let local_id = MetadataCollectionId::generate();
        let remote_id = MetadataCollectionId::generate();
        let processor = processor_with_local_entity(local_id, None);

        let guid = InstanceGuid::generate();
        let entity = remote_entity(remote_id, guid, 1, InstanceTimestamp::now());
        processor.handle_event(
            processor.wrapper.make_envelope(CohortEventType::NewEntity).with_entity(entity),
        ).await;

        let EntityLookup::FullEntity(stored) = processor.wrapper.peek_entity(guid).await.expect("lookup ok") else {
            panic!("expected the reference copy to be stored");
        };
        assert_eq!(stored.version, InstanceVersion::new(1));
    }

    #[tokio::test]
    async fn out_of_order_update_is_dropped_per_p3() {
        let local_id = MetadataCollectionId::generate();
        let remote_id = MetadataCollectionId::generate();
        let guid = InstanceGuid::generate();
        let create_time = InstanceTimestamp::now();
        let seeded = remote_entity(remote_id, guid, 3, create_time);
        let processor = processor_with_local_entity(local_id, Some(seeded));

        let stale = remote_entity(remote_id, guid, 2, create_time);
        processor
            .handle_event(processor.wrapper.make_envelope(CohortEventType::UpdatedEntity).with_entity(stale))
            .await;

        let EntityLookup::FullEntity(stored) = processor.wrapper.peek_entity(guid).await.expect("lookup ok") else {
            panic!("expected the prior reference copy to remain");
        };
        assert_eq!(stored.version, InstanceVersion::new(3), "v2 must not overwrite v3 (P3)");
    }

    #[tokio::test]
    async fn create_time_mismatch_raises_a_guid_collision() {
        let local_id = MetadataCollectionId::generate();
        let remote_id = MetadataCollectionId::generate();
        let guid = InstanceGuid::generate();
        let seeded = remote_entity(remote_id, guid, 1, InstanceTimestamp::UNIX_EPOCH);
        let processor = processor_with_local_entity(local_id, Some(seeded));

        let bus = Arc::new(InMemoryBus::new());
        let wrapper = Arc::new(LocalRepositoryWrapper::new(
            Arc::new(InMemoryCollection::new().seed_entity(remote_entity(remote_id, guid, 1, InstanceTimestamp::UNIX_EPOCH))),
            BasicInstanceValidator,
            BasicInstanceFactory,
            Some(Arc::new(crate::bus::OutboundEventEmitter::spawn(
                bus.clone(),
                8,
                crate::bus::OverflowPolicy::DropOldest,
            ))),
            LocalRepositoryConfig {
                local_metadata_collection_id: local_id,
                local_metadata_collection_name: "local".to_owned(),
                produce_events_for_real_connector: true,
            },
        ));
        let processor = InstanceEventProcessor::new(wrapper, Arc::new(TypeNameAllowList::all()));

        let other_remote = MetadataCollectionId::generate();
        let colliding = remote_entity(other_remote, guid, 1, InstanceTimestamp::now());
        processor
            .handle_event(processor.wrapper.make_envelope(CohortEventType::NewEntity).with_entity(colliding))
            .await;

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let published = bus.drain();
        assert!(
            published.iter().any(|e| e.event_type == CohortEventType::ConflictingInstances),
            "a createTime mismatch must raise CONFLICTING_INSTANCES"
        );

        let EntityLookup::FullEntity(stored) = processor.wrapper.peek_entity(guid).await.expect("lookup ok") else {
            panic!("original entity must remain stored");
        };
        assert_eq!(stored.provenance.metadata_collection_id, remote_id, "the colliding instance must not overwrite it");
    }

    #[tokio::test]
    async fn conflicting_instances_targeting_us_reidentifies_our_entity() {
        let local_id = MetadataCollectionId::generate();
        let guid = InstanceGuid::generate();
        let local_entity = Entity {
            provenance: Provenance::local(local_id, "local".to_owned()),
            ..remote_entity(local_id, guid, 1, InstanceTimestamp::now())
        };
        let processor = processor_with_local_entity(local_id, Some(local_entity));

        let mut envelope = processor.wrapper.make_envelope(CohortEventType::ConflictingInstances);
        envelope.target_metadata_collection_id = Some(local_id);
        envelope.target_instance_guid = Some(guid);
        processor.handle_event(envelope).await;

        assert!(
            matches!(processor.wrapper.peek_entity(guid).await, Ok(EntityLookup::NotFound)),
            "the original GUID must no longer resolve after re-identification"
        );
    }

    #[tokio::test]
    async fn purged_entity_event_removes_the_reference_copy() {
        let local_id = MetadataCollectionId::generate();
        let remote_id = MetadataCollectionId::generate();
        let guid = InstanceGuid::generate();
        let seeded = remote_entity(remote_id, guid, 1, InstanceTimestamp::now());
        let processor = processor_with_local_entity(local_id, Some(seeded));

        let mut envelope = processor.wrapper.make_envelope(CohortEventType::PurgedEntity);
        envelope.instance_guid = Some(guid);
        processor.handle_event(envelope).await;

        assert!(matches!(processor.wrapper.peek_entity(guid).await, Ok(EntityLookup::NotFound)));
    }

    #[tokio::test]
    async fn refresh_request_idempotence_matches_p5() {
        let local_id = MetadataCollectionId::generate();
        let guid = InstanceGuid::generate();
        let local_entity = Entity {
            provenance: Provenance::local(local_id, "local".to_owned()),
            ..remote_entity(local_id, guid, 1, InstanceTimestamp::now())
        };
        let bus = Arc::new(InMemoryBus::new());
        let wrapper = Arc::new(LocalRepositoryWrapper::new(
            Arc::new(InMemoryCollection::new().seed_entity(local_entity)),
            BasicInstanceValidator,
            BasicInstanceFactory,
            Some(Arc::new(crate::bus::OutboundEventEmitter::spawn(
                bus.clone(),
                8,
                crate::bus::OverflowPolicy::DropOldest,
            ))),
            LocalRepositoryConfig {
                local_metadata_collection_id: local_id,
                local_metadata_collection_name: "local".to_owned(),
                produce_events_for_real_connector: true,
            },
        ));
        let processor = InstanceEventProcessor::new(wrapper, Arc::new(TypeNameAllowList::all()));

        for _ in 0..3 {
            let mut envelope = processor.wrapper.make_envelope(CohortEventType::RefreshEntityRequest);
            envelope.instance_guid = Some(guid);
            envelope.home_metadata_collection_id = Some(local_id);
            processor.handle_event(envelope).await;
        }

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let published = bus.drain();
        let refreshed: Vec<_> = published
            .into_iter()
            .filter(|e| e.event_type == CohortEventType::RefreshedEntity)
            .collect();
        assert_eq!(refreshed.len(), 3, "N requests must produce N REFRESHED_ENTITY events");
        assert!(
            refreshed.windows(2).all(|pair| pair[0].entity == pair[1].entity),
            "payloads must be identical across refreshes"
        );

        assert!(matches!(processor.wrapper.peek_entity(guid).await, Ok(EntityLookup::FullEntity(_))));
    }

    #[tokio::test]
    async fn type_version_regression_raises_conflicting_type_and_does_not_store() {
        let local_id = MetadataCollectionId::generate();
        let remote_id = MetadataCollectionId::generate();
        let guid = InstanceGuid::generate();
        let create_time = InstanceTimestamp::now();
        let mut stored = remote_entity(remote_id, guid, 1, create_time);
        stored.entity_type.version = TypeVersion::new(2);
        let processor = processor_with_local_entity(local_id, Some(stored));

        let mut regressed = remote_entity(remote_id, guid, 2, create_time);
        regressed.entity_type.version = TypeVersion::new(1);
        processor
            .handle_event(processor.wrapper.make_envelope(CohortEventType::UpdatedEntity).with_entity(regressed))
            .await;

        let EntityLookup::FullEntity(current) = processor.wrapper.peek_entity(guid).await.expect("lookup ok") else {
            panic!("stored entity must remain");
        };
        assert_eq!(current.version, InstanceVersion::new(1), "the type-version regression must not be stored");
    }
}
