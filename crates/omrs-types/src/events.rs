use serde::{Deserialize, Serialize};

use crate::{
    entity::Entity,
    ids::{InstanceGuid, MetadataCollectionId, TypeDefGuid},
    relationship::Relationship,
    typedef::TypeDefSummary,
};

/// The discriminated set of cohort event types (spec.md §4.3's dispatch table).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CohortEventType {
    NewEntity,
    UpdatedEntity,
    UndoneEntity,
    ClassifiedEntity,
    ReclassifiedEntity,
    DeclassifiedEntity,
    DeletedEntity,
    RestoredEntity,
    ReIdentifiedEntity,
    ReTypedEntity,
    ReHomedEntity,
    RefreshedEntity,
    PurgedEntity,
    RefreshEntityRequest,
    NewRelationship,
    UpdatedRelationship,
    UndoneRelationship,
    DeletedRelationship,
    RestoredRelationship,
    ReIdentifiedRelationship,
    ReTypedRelationship,
    ReHomedRelationship,
    RefreshedRelationship,
    PurgedRelationship,
    RefreshRelationshipRequest,
    BatchInstances,
    ConflictingInstances,
    ConflictingType,
}

/// Identifies the repository that produced a [`CohortEventEnvelope`] (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Originator {
    pub metadata_collection_id: MetadataCollectionId,
    pub server_name: String,
    pub server_type: String,
    pub organization_name: String,
}

/// A batch of instances carried by a `BATCH_INSTANCES` event (spec.md §6), consumed by
/// `saveInstanceReferenceCopies`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// A minimal identity + type reference, used for the `original*`/`target*`/`other*` summary
/// fields on re-identify/re-type/re-home and conflict events, where the full instance is not
/// always available or needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub instance_guid: InstanceGuid,
    pub type_def_summary: TypeDefSummary,
}

/// The single inbound wire type for cohort event exchange (spec.md §6).
///
/// All embedded instances carry full provenance (I3). Unknown fields are ignored on
/// deserialization and absent optional fields are elided on serialization, matching the
/// "nulls elided on output" design note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortEventEnvelope {
    pub event_type: CohortEventType,
    pub originator: Originator,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_entity: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_relationship: Option<Relationship>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_def_guid: Option<TypeDefGuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_def_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_guid: Option<InstanceGuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_instance_guid: Option<InstanceGuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type_def_summary: Option<TypeDefSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_metadata_collection_id: Option<MetadataCollectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_home_metadata_collection_id: Option<MetadataCollectionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_metadata_collection_id: Option<MetadataCollectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type_def_summary: Option<TypeDefSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_instance_guid: Option<InstanceGuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_metadata_collection_id: Option<MetadataCollectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_type_def_summary: Option<TypeDefSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_instance_guid: Option<InstanceGuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_origin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_batch: Option<InstanceGraph>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CohortEventEnvelope {
    #[must_use]
    pub fn new(event_type: CohortEventType, originator: Originator) -> Self {
        Self {
            event_type,
            originator,
            entity: None,
            original_entity: None,
            relationship: None,
            original_relationship: None,
            type_def_guid: None,
            type_def_name: None,
            instance_guid: None,
            original_instance_guid: None,
            original_type_def_summary: None,
            home_metadata_collection_id: None,
            original_home_metadata_collection_id: None,
            target_metadata_collection_id: None,
            target_type_def_summary: None,
            target_instance_guid: None,
            other_metadata_collection_id: None,
            other_type_def_summary: None,
            other_instance_guid: None,
            other_origin: None,
            instance_batch: None,
            error_code: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = Some(relationship);
        self
    }

    #[must_use]
    pub fn with_instance_guid(mut self, instance_guid: InstanceGuid) -> Self {
        self.instance_guid = Some(instance_guid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let originator = Originator {
            metadata_collection_id: MetadataCollectionId::generate(),
            server_name: "server-a".to_owned(),
            server_type: "Repository".to_owned(),
            organization_name: "Acme".to_owned(),
        };
        let envelope = CohortEventEnvelope::new(CohortEventType::PurgedEntity, originator)
            .with_instance_guid(InstanceGuid::generate());
        let json = serde_json::to_string(&envelope).expect("serialize");
        let back: CohortEventEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(envelope, back);
    }
}
