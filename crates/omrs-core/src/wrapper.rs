//! Local repository wrapper (C7): the single mediator between callers and the embedded storage
//! engine. Every operation validates parameters, authorizes via C4, delegates to storage, stamps
//! provenance on the result, and — if the operation is a state change and events are enabled —
//! publishes via C6.

use std::{collections::HashMap, sync::Arc};

use error_stack::{ensure, Report, Result, ResultExt};
use omrs_types::{
    classification::Classification,
    entity::Entity,
    events::{CohortEventEnvelope, CohortEventType, Originator},
    ids::{AccountId, InstanceGuid, MetadataCollectionId},
    provenance::Provenance,
    relationship::Relationship,
    status::InstanceStatus,
    typedef::TypeDefSummary,
};
use uuid::Uuid;

use crate::{
    authorization::{Operation, SecurityVerifier},
    bus::OutboundEventEmitter,
    collection::{Collection, ConflictBehavior, EntityLookup},
    error::{
        ClassificationError, EntityNotDeleted, EntityProxyOnly, HomeEntity, HomeRelationship, InvalidEntity,
        LogicError, RelationshipNotDeleted,
    },
    validation::{InstanceFactory, InstanceValidator},
};

/// The subset of spec.md §6's configuration surface the wrapper itself consults.
#[derive(Debug, Clone)]
pub struct LocalRepositoryConfig {
    pub local_metadata_collection_id: MetadataCollectionId,
    pub local_metadata_collection_name: String,
    pub produce_events_for_real_connector: bool,
}

impl LocalRepositoryConfig {
    fn local_origin(&self) -> Provenance {
        Provenance::local(self.local_metadata_collection_id, self.local_metadata_collection_name.clone())
    }

    fn originator(&self) -> Originator {
        Originator {
            metadata_collection_id: self.local_metadata_collection_id,
            server_name: self.local_metadata_collection_name.clone(),
            server_type: "Repository".to_owned(),
            organization_name: String::new(),
        }
    }
}

/// Mediates every call between a caller and the embedded [`Collection`], the way spec.md §4.1
/// describes C7.
pub struct LocalRepositoryWrapper<C, V, F> {
    collection: Arc<C>,
    validator: V,
    factory: F,
    emitter: Option<Arc<OutboundEventEmitter>>,
    config: LocalRepositoryConfig,
}

impl<C, V, F> LocalRepositoryWrapper<C, V, F>
where
    C: Collection,
    V: InstanceValidator,
    F: InstanceFactory,
{
    pub fn new(
        collection: Arc<C>,
        validator: V,
        factory: F,
        emitter: Option<Arc<OutboundEventEmitter>>,
        config: LocalRepositoryConfig,
    ) -> Self {
        Self {
            collection,
            validator,
            factory,
            emitter,
            config,
        }
    }

    #[must_use]
    pub const fn local_metadata_collection_id(&self) -> MetadataCollectionId {
        self.config.local_metadata_collection_id
    }

    /// Exposes the structural validator (C2) to the event processor's compare-and-validate step
    /// (spec.md §4.3 step 2); not part of the caller-facing surface.
    pub(crate) const fn validator(&self) -> &V {
        &self.validator
    }

    /// Stamps provenance on a freshly-returned instance (spec.md §4.1 "Provenance stamping").
    ///
    /// An instance whose collection id is the nil UUID is treated as "not yet stamped" — the
    /// Rust type system has no null `MetadataCollectionId`, so the nil UUID plays that role,
    /// matching the source's "null metadataCollectionId" check.
    fn stamp_provenance(&self, provenance: &mut Provenance) {
        if provenance.metadata_collection_id.as_uuid() == Uuid::nil() {
            *provenance = self.config.local_origin();
        } else if provenance.metadata_collection_id == self.config.local_metadata_collection_id
            && provenance.metadata_collection_name.is_empty()
        {
            provenance.metadata_collection_name = self.config.local_metadata_collection_name.clone();
        }
    }

    async fn authorize<A: SecurityVerifier>(
        &self,
        verifier: &A,
        actor: AccountId,
        operation: Operation,
    ) -> Result<(), crate::error::UserNotAuthorized> {
        verifier.check_authorized(actor, operation).await
    }

    async fn emit(&self, envelope: CohortEventEnvelope) {
        if !self.config.produce_events_for_real_connector {
            return;
        }
        if let Some(emitter) = &self.emitter {
            emitter.emit(envelope).await;
        }
    }

    fn envelope(&self, event_type: CohortEventType) -> CohortEventEnvelope {
        CohortEventEnvelope::new(event_type, self.config.originator())
    }

    /// Lets the event processor (C8) publish audit/conflict events (`CONFLICTING_INSTANCES`,
    /// `CONFLICTING_TYPE`) through this wrapper's emitter without exposing the emitter itself.
    pub(crate) async fn emit_envelope(&self, envelope: CohortEventEnvelope) {
        self.emit(envelope).await;
    }

    #[must_use]
    pub(crate) fn make_envelope(&self, event_type: CohortEventType) -> CohortEventEnvelope {
        self.envelope(event_type)
    }

    // ---- instance reads -------------------------------------------------

    #[tracing::instrument(skip(self, verifier))]
    pub async fn is_entity_known<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<bool, crate::error::RepositoryError> {
        self.authorize(verifier, actor, Operation::ReadInstance)
            .await
            .change_context(crate::error::RepositoryError)?;
        Ok(!matches!(self.collection.lookup_entity(guid).await?, EntityLookup::NotFound))
    }

    /// Returns the full entity, failing with [`EntityProxyOnly`] if only a proxy is stored —
    /// the explicit result-variant translation spec.md §9 calls for instead of the source's
    /// thrown exception.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn get_entity_detail<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Entity, EntityProxyOnly> {
        self.authorize(verifier, actor, Operation::ReadInstance)
            .await
            .change_context(EntityProxyOnly)?;
        match self
            .collection
            .lookup_entity(guid)
            .await
            .change_context(EntityProxyOnly)?
        {
            EntityLookup::FullEntity(mut entity) => {
                self.stamp_provenance(&mut entity.provenance);
                Ok(*entity)
            }
            EntityLookup::ProxyOnly(_) => Err(Report::new(EntityProxyOnly)),
            EntityLookup::NotFound => {
                Err(Report::new(EntityProxyOnly).attach_printable("entity not known locally"))
            }
        }
    }

    #[tracing::instrument(skip(self, verifier))]
    pub async fn find_entities_by_property<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        type_name: Option<&str>,
        property_name: &str,
        property_value: &serde_json::Value,
    ) -> Result<Vec<Entity>, crate::error::RepositoryError> {
        self.authorize(verifier, actor, Operation::ReadInstance)
            .await
            .change_context(crate::error::RepositoryError)?;
        let mut entities = self
            .collection
            .find_entities_by_property(type_name, property_name, property_value)
            .await?;
        for entity in &mut entities {
            self.stamp_provenance(&mut entity.provenance);
        }
        Ok(entities)
    }

    // ---- instance writes --------------------------------------------------

    /// Creates a new locally-homed entity: assigns identity via C3, stamps `LOCAL_COHORT`
    /// provenance, stores it, and emits `NEW_ENTITY`.
    #[tracing::instrument(skip(self, verifier, properties))]
    pub async fn add_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        entity_type: TypeDefSummary,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Entity, InvalidEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(InvalidEntity)?;
        let entity = self
            .factory
            .new_entity(entity_type, self.config.local_origin(), properties);
        self.validator.validate_entity(&entity)?;

        let stored = self
            .collection
            .put_entity(entity, ConflictBehavior::Fail)
            .await
            .change_context(InvalidEntity)?;

        self.emit(self.envelope(CohortEventType::NewEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// `addExternalEntity` (spec.md §4.1's "External-source write protocol"): the instance is
    /// homed at the external source and stored locally as a reference copy with
    /// `replicatedBy` set to the local collection, so the cohort treats this server as the
    /// replication point.
    #[tracing::instrument(skip(self, verifier, properties))]
    pub async fn add_external_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        entity_type: TypeDefSummary,
        external_source_id: MetadataCollectionId,
        external_source_name: String,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Entity, InvalidEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(InvalidEntity)?;
        let provenance = Provenance::external(
            external_source_id,
            external_source_name,
            self.config.local_metadata_collection_id,
        );
        let entity = self.factory.new_entity(entity_type, provenance, properties);
        self.validator.validate_entity(&entity)?;

        let stored = self
            .collection
            .put_entity(entity, ConflictBehavior::Fail)
            .await
            .change_context(InvalidEntity)?;

        self.emit(self.envelope(CohortEventType::NewEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Updates the properties of a locally-homed entity. Fails with [`HomeEntity`] if the
    /// stored instance is a reference copy (I7: reference copies are read-only locally).
    #[tracing::instrument(skip(self, verifier, properties))]
    pub async fn update_entity_properties<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Entity, HomeEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeEntity)?;
        let current = self.require_full_local_entity(guid).await?;

        let mut updated = current;
        updated.properties = properties;
        updated.version = updated.version.next();
        updated.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(updated)
            .await
            .change_context(HomeEntity)?;

        self.emit(self.envelope(CohortEventType::UpdatedEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Soft-deletes a locally-homed entity (I8: required before `purge_entity`).
    #[tracing::instrument(skip(self, verifier))]
    pub async fn delete_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Entity, HomeEntity> {
        self.authorize(verifier, actor, Operation::DeleteInstance)
            .await
            .change_context(HomeEntity)?;
        let mut current = self.require_full_local_entity(guid).await?;
        current.status = InstanceStatus::Deleted;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(HomeEntity)?;

        self.emit(self.envelope(CohortEventType::DeletedEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Restores a soft-deleted, locally-homed entity to `ACTIVE`.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn restore_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Entity, HomeEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeEntity)?;
        let mut current = self.require_full_local_entity(guid).await?;
        ensure!(current.status.is_deleted(), Report::new(HomeEntity).attach_printable("entity is not deleted"));
        current.status = InstanceStatus::Active;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(HomeEntity)?;

        self.emit(self.envelope(CohortEventType::RestoredEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Hard-removes a locally-homed entity. I8: legal only when the instance is `DELETED`.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn purge_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        entity_type: TypeDefSummary,
    ) -> Result<(), EntityNotDeleted> {
        self.authorize(verifier, actor, Operation::PurgeInstance)
            .await
            .change_context(EntityNotDeleted)?;
        let current = self
            .collection
            .get_entity(guid)
            .await
            .change_context(EntityNotDeleted)?;
        ensure!(current.status.is_deleted(), EntityNotDeleted);

        self.collection.purge_entity(guid).await.change_context(EntityNotDeleted)?;

        let mut envelope = self.envelope(CohortEventType::PurgedEntity);
        envelope.instance_guid = Some(guid);
        envelope.type_def_guid = Some(entity_type.guid);
        envelope.type_def_name = Some(entity_type.name);
        self.emit(envelope).await;
        Ok(())
    }

    /// Reference-copy maintenance: accepts an instance pushed by its home, bypassing local
    /// write checks (I7 carves this path out explicitly). Used by the event processor, not by
    /// ordinary callers.
    #[tracing::instrument(skip(self, entity))]
    pub async fn save_entity_reference_copy(&self, entity: Entity) -> Result<Entity, LogicError> {
        ensure!(
            entity.provenance.metadata_collection_id != self.config.local_metadata_collection_id,
            Report::new(LogicError).attach_printable("refusing to store a reference copy homed locally")
        );
        self.collection
            .put_entity(entity, ConflictBehavior::Skip)
            .await
            .change_context(LogicError)
    }

    #[tracing::instrument(skip(self))]
    pub async fn purge_entity_reference_copy(&self, guid: InstanceGuid) -> Result<(), LogicError> {
        self.collection.purge_entity(guid).await.change_context(LogicError)
    }

    /// Adds a classification to a locally-homed entity, emitting `CLASSIFIED_ENTITY`.
    #[tracing::instrument(skip(self, verifier, classification))]
    pub async fn classify_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        classification: Classification,
    ) -> Result<Entity, ClassificationError> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(ClassificationError)?;
        let mut current = self
            .require_full_local_entity(guid)
            .await
            .change_context(ClassificationError)?;
        ensure!(
            !current
                .classifications
                .iter()
                .any(|existing| existing.classification_type.name == classification.classification_type.name),
            Report::new(ClassificationError).attach_printable("entity is already classified with this type")
        );
        current.classifications.push(classification);
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(ClassificationError)?;

        self.emit(self.envelope(CohortEventType::ClassifiedEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Removes a classification from a locally-homed entity, emitting `DECLASSIFIED_ENTITY`.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn declassify_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        classification_name: &str,
    ) -> Result<Entity, ClassificationError> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(ClassificationError)?;
        let mut current = self
            .require_full_local_entity(guid)
            .await
            .change_context(ClassificationError)?;
        let before = current.classifications.len();
        current
            .classifications
            .retain(|existing| existing.classification_type.name != classification_name);
        ensure!(
            current.classifications.len() < before,
            Report::new(ClassificationError).attach_printable("entity does not carry this classification")
        );
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(ClassificationError)?;

        self.emit(self.envelope(CohortEventType::DeclassifiedEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Replaces the properties of a classification already carried by a locally-homed entity,
    /// emitting `RECLASSIFIED_ENTITY`.
    #[tracing::instrument(skip(self, verifier, classification))]
    pub async fn update_entity_classification<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        classification: Classification,
    ) -> Result<Entity, ClassificationError> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(ClassificationError)?;
        let mut current = self
            .require_full_local_entity(guid)
            .await
            .change_context(ClassificationError)?;
        let existing = current
            .classifications
            .iter_mut()
            .find(|existing| existing.classification_type.name == classification.classification_type.name)
            .ok_or_else(|| {
                Report::new(ClassificationError).attach_printable("entity does not carry this classification")
            })?;
        *existing = classification;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(ClassificationError)?;

        self.emit(self.envelope(CohortEventType::ReclassifiedEntity).with_entity(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Re-identifies a locally-homed entity with a freshly generated GUID, preserving its
    /// contents (spec.md §4.3's `CONFLICTING_INSTANCES` handling "re-identify the local
    /// instance... preserving its contents"). Emits `RE_IDENTIFIED_ENTITY` carrying the
    /// original GUID.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn reidentify_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Entity, HomeEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeEntity)?;
        let current = self.require_full_local_entity(guid).await?;
        self.reidentify_local_entity(current).await
    }

    /// Shared by [`Self::reidentify_entity`] and the event processor's GUID-collision handling,
    /// which re-identifies without going through the authorization gate (inbound cohort events
    /// are not caller-initiated operations).
    pub(crate) async fn reidentify_local_entity(&self, mut current: Entity) -> Result<Entity, HomeEntity> {
        let original_guid = current.guid;
        self.collection
            .purge_entity(original_guid)
            .await
            .change_context(HomeEntity)?;

        current.guid = InstanceGuid::generate();
        let stored = self
            .collection
            .put_entity(current, ConflictBehavior::Fail)
            .await
            .change_context(HomeEntity)?;

        let mut envelope = self.envelope(CohortEventType::ReIdentifiedEntity).with_entity(stored.clone());
        envelope.original_instance_guid = Some(original_guid);
        self.emit(envelope).await;
        Ok(stored)
    }

    /// Changes the type reference of a locally-homed entity, emitting `RE_TYPED_ENTITY` with
    /// the prior type carried as `originalTypeDefSummary`.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn retype_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        new_type: TypeDefSummary,
    ) -> Result<Entity, HomeEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeEntity)?;
        let mut current = self.require_full_local_entity(guid).await?;
        let original_type = current.entity_type.clone();
        current.entity_type = new_type;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(HomeEntity)?;

        let mut envelope = self.envelope(CohortEventType::ReTypedEntity).with_entity(stored.clone());
        envelope.original_type_def_summary = Some(original_type);
        self.emit(envelope).await;
        Ok(stored)
    }

    /// Moves a locally-homed entity's home to another metadata collection, emitting
    /// `RE_HOMED_ENTITY` with the prior home id carried as `originalHomeMetadataCollectionId`.
    /// After this call the instance is no longer locally homed; the wrapper does not retain it
    /// as a reference copy (the new home is expected to push one back through the cohort).
    #[tracing::instrument(skip(self, verifier))]
    pub async fn rehome_entity<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        new_home: MetadataCollectionId,
        new_home_name: String,
    ) -> Result<Entity, HomeEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeEntity)?;
        let mut current = self.require_full_local_entity(guid).await?;
        let original_home = current.provenance.metadata_collection_id;
        current.provenance = Provenance::local(new_home, new_home_name);
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_entity(current)
            .await
            .change_context(HomeEntity)?;

        let mut envelope = self.envelope(CohortEventType::ReHomedEntity).with_entity(stored.clone());
        envelope.original_home_metadata_collection_id = Some(original_home);
        self.emit(envelope).await;
        Ok(stored)
    }

    /// Emits a `REFRESH_ENTITY_REQUEST` event asking `home` to resend the current state of
    /// `guid` (spec.md §4.1's reference-copy maintenance `refreshEntityReferenceCopy`, used by
    /// the retrieval event processor when a federated read surfaces an unknown GUID).
    #[tracing::instrument(skip(self))]
    pub async fn request_entity_refresh(&self, guid: InstanceGuid, home: MetadataCollectionId) {
        let mut envelope = self.envelope(CohortEventType::RefreshEntityRequest);
        envelope.instance_guid = Some(guid);
        envelope.home_metadata_collection_id = Some(home);
        self.emit(envelope).await;
    }

    /// Handles an inbound `REFRESH_ENTITY_REQUEST`: if `guid` is known and locally homed, emits
    /// `REFRESHED_ENTITY` carrying its current state (spec.md §4.3's dispatch table, P5's
    /// refresh idempotence). A no-op (not an error) if the instance isn't ours to answer for.
    #[tracing::instrument(skip(self))]
    pub async fn answer_refresh_request(&self, guid: InstanceGuid, requested_home: MetadataCollectionId) {
        if requested_home != self.config.local_metadata_collection_id {
            return;
        }
        let Ok(EntityLookup::FullEntity(entity)) = self.collection.lookup_entity(guid).await else {
            return;
        };
        if entity.provenance.metadata_collection_id != self.config.local_metadata_collection_id {
            return;
        }
        self.emit(self.envelope(CohortEventType::RefreshedEntity).with_entity(*entity))
            .await;
    }

    /// Raw GUID lookup bypassing authorization, for the event processor's compare-and-validate
    /// step (spec.md §4.3) and for federation's home resolution. Not part of the caller-facing
    /// surface: ordinary callers go through [`Self::get_entity_detail`] or
    /// [`Self::is_entity_known`].
    pub async fn peek_entity(&self, guid: InstanceGuid) -> Result<EntityLookup, crate::error::RepositoryError> {
        self.collection.lookup_entity(guid).await
    }

    async fn require_full_local_entity(&self, guid: InstanceGuid) -> Result<Entity, HomeEntity> {
        let entity = match self
            .collection
            .lookup_entity(guid)
            .await
            .change_context(HomeEntity)?
        {
            EntityLookup::FullEntity(entity) => *entity,
            EntityLookup::ProxyOnly(_) => {
                return Err(Report::new(HomeEntity).attach_printable("only a proxy is stored for this GUID"))
            }
            EntityLookup::NotFound => return Err(Report::new(HomeEntity).attach_printable("entity not known")),
        };
        ensure!(
            entity.provenance.metadata_collection_id == self.config.local_metadata_collection_id,
            Report::new(HomeEntity).attach_printable("entity is a reference copy; it is read-only locally")
        );
        Ok(entity)
    }

    // ---- relationships -----------------------------------------------------

    #[tracing::instrument(skip(self, verifier))]
    pub async fn is_relationship_known<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<bool, crate::error::RepositoryError> {
        self.authorize(verifier, actor, Operation::ReadInstance)
            .await
            .change_context(crate::error::RepositoryError)?;
        match self.collection.get_relationship(guid).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// Stores a new locally-homed relationship. I6: the caller must supply proxies/entities for
    /// both ends; this wrapper does not itself resolve them, it trusts the caller-constructed
    /// [`Relationship`] to already carry valid endpoints (endpoint existence is enforced by the
    /// storage engine, which is consulted via `put_relationship`).
    #[tracing::instrument(skip(self, verifier, relationship))]
    pub async fn add_relationship<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        relationship: Relationship,
    ) -> Result<Relationship, InvalidEntity> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(InvalidEntity)?;
        self.validator.validate_relationship(&relationship)?;

        let stored = self
            .collection
            .put_relationship(relationship, ConflictBehavior::Fail)
            .await
            .change_context(InvalidEntity)?;

        self.emit(
            self.envelope(CohortEventType::NewRelationship)
                .with_relationship(stored.clone()),
        )
        .await;
        Ok(stored)
    }

    #[tracing::instrument(skip(self))]
    pub async fn save_relationship_reference_copy(&self, relationship: Relationship) -> Result<Relationship, LogicError> {
        ensure!(
            relationship.provenance.metadata_collection_id != self.config.local_metadata_collection_id,
            Report::new(LogicError).attach_printable("refusing to store a reference copy homed locally")
        );
        self.collection
            .put_relationship(relationship, ConflictBehavior::Skip)
            .await
            .change_context(LogicError)
    }

    #[tracing::instrument(skip(self))]
    pub async fn purge_relationship_reference_copy(&self, guid: InstanceGuid) -> Result<(), LogicError> {
        self.collection.purge_relationship(guid).await.change_context(LogicError)
    }

    /// Updates the properties of a locally-homed relationship, the symmetric counterpart of
    /// [`Self::update_entity_properties`] (I7).
    #[tracing::instrument(skip(self, verifier, properties))]
    pub async fn update_relationship_properties<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Relationship, HomeRelationship> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeRelationship)?;
        let mut current = self.require_home_relationship(guid).await?;
        current.properties = properties;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_relationship(current)
            .await
            .change_context(HomeRelationship)?;

        self.emit(
            self.envelope(CohortEventType::UpdatedRelationship)
                .with_relationship(stored.clone()),
        )
        .await;
        Ok(stored)
    }

    /// Soft-deletes a locally-homed relationship (I8).
    #[tracing::instrument(skip(self, verifier))]
    pub async fn delete_relationship<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Relationship, HomeRelationship> {
        self.authorize(verifier, actor, Operation::DeleteInstance)
            .await
            .change_context(HomeRelationship)?;
        let mut current = self.require_home_relationship(guid).await?;
        current.status = InstanceStatus::Deleted;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_relationship(current)
            .await
            .change_context(HomeRelationship)?;

        self.emit(
            self.envelope(CohortEventType::DeletedRelationship)
                .with_relationship(stored.clone()),
        )
        .await;
        Ok(stored)
    }

    /// Restores a soft-deleted, locally-homed relationship to `ACTIVE`.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn restore_relationship<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Relationship, HomeRelationship> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeRelationship)?;
        let mut current = self.require_home_relationship(guid).await?;
        ensure!(
            current.status.is_deleted(),
            Report::new(HomeRelationship).attach_printable("relationship is not deleted")
        );
        current.status = InstanceStatus::Active;
        current.version = current.version.next();
        current.update_time = omrs_types::timestamp::InstanceTimestamp::now();

        let stored = self
            .collection
            .update_relationship(current)
            .await
            .change_context(HomeRelationship)?;

        self.emit(
            self.envelope(CohortEventType::RestoredRelationship)
                .with_relationship(stored.clone()),
        )
        .await;
        Ok(stored)
    }

    /// Hard-removes a locally-homed relationship. I8: legal only when `DELETED`.
    #[tracing::instrument(skip(self, verifier))]
    pub async fn purge_relationship<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
        relationship_type: TypeDefSummary,
    ) -> Result<(), RelationshipNotDeleted> {
        self.authorize(verifier, actor, Operation::PurgeInstance)
            .await
            .change_context(RelationshipNotDeleted)?;
        let current = self
            .collection
            .get_relationship(guid)
            .await
            .change_context(RelationshipNotDeleted)?;
        ensure!(current.status.is_deleted(), RelationshipNotDeleted);

        self.collection
            .purge_relationship(guid)
            .await
            .change_context(RelationshipNotDeleted)?;

        let mut envelope = self.envelope(CohortEventType::PurgedRelationship);
        envelope.instance_guid = Some(guid);
        envelope.type_def_guid = Some(relationship_type.guid);
        envelope.type_def_name = Some(relationship_type.name);
        self.emit(envelope).await;
        Ok(())
    }

    /// Re-identifies a locally-homed relationship with a freshly generated GUID, the symmetric
    /// counterpart of [`Self::reidentify_entity`].
    #[tracing::instrument(skip(self, verifier))]
    pub async fn reidentify_relationship<A: SecurityVerifier>(
        &self,
        actor: AccountId,
        verifier: &A,
        guid: InstanceGuid,
    ) -> Result<Relationship, HomeRelationship> {
        self.authorize(verifier, actor, Operation::WriteInstance)
            .await
            .change_context(HomeRelationship)?;
        let mut current = self.require_home_relationship(guid).await?;
        let original_guid = current.guid;
        self.collection
            .purge_relationship(original_guid)
            .await
            .change_context(HomeRelationship)?;

        current.guid = InstanceGuid::generate();
        let stored = self
            .collection
            .put_relationship(current, ConflictBehavior::Fail)
            .await
            .change_context(HomeRelationship)?;

        let mut envelope = self
            .envelope(CohortEventType::ReIdentifiedRelationship)
            .with_relationship(stored.clone());
        envelope.original_instance_guid = Some(original_guid);
        self.emit(envelope).await;
        Ok(stored)
    }

    /// Emits a `REFRESH_RELATIONSHIP_REQUEST` event, the symmetric counterpart of
    /// [`Self::request_entity_refresh`].
    #[tracing::instrument(skip(self))]
    pub async fn request_relationship_refresh(&self, guid: InstanceGuid, home: MetadataCollectionId) {
        let mut envelope = self.envelope(CohortEventType::RefreshRelationshipRequest);
        envelope.instance_guid = Some(guid);
        envelope.home_metadata_collection_id = Some(home);
        self.emit(envelope).await;
    }

    /// Handles an inbound `REFRESH_RELATIONSHIP_REQUEST`, the symmetric counterpart of
    /// [`Self::answer_refresh_request`].
    #[tracing::instrument(skip(self))]
    pub async fn answer_relationship_refresh_request(&self, guid: InstanceGuid, requested_home: MetadataCollectionId) {
        if requested_home != self.config.local_metadata_collection_id {
            return;
        }
        let Ok(relationship) = self.collection.get_relationship(guid).await else {
            return;
        };
        if relationship.provenance.metadata_collection_id != self.config.local_metadata_collection_id {
            return;
        }
        self.emit(
            self.envelope(CohortEventType::RefreshedRelationship)
                .with_relationship(relationship),
        )
        .await;
    }

    /// Raw GUID lookup bypassing authorization, the relationship counterpart of
    /// [`Self::peek_entity`].
    pub async fn peek_relationship(&self, guid: InstanceGuid) -> Result<Option<Relationship>, crate::error::RepositoryError> {
        match self.collection.get_relationship(guid).await {
            Ok(relationship) => Ok(Some(relationship)),
            Err(_) => Ok(None),
        }
    }

    async fn require_home_relationship(&self, guid: InstanceGuid) -> Result<Relationship, HomeRelationship> {
        let relationship = self
            .collection
            .get_relationship(guid)
            .await
            .change_context(HomeRelationship)?;
        ensure!(
            relationship.provenance.metadata_collection_id == self.config.local_metadata_collection_id,
            Report::new(HomeRelationship).attach_printable("relationship is a reference copy; it is read-only locally")
        );
        Ok(relationship)
    }
}
