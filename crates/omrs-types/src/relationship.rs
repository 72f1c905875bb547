use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    entity_proxy::EntityProxy,
    ids::{InstanceGuid, MetadataCollectionId},
    provenance::Provenance,
    status::InstanceStatus,
    timestamp::{InstanceTimestamp, InstanceVersion},
    typedef::TypeDefSummary,
};

/// Connects exactly two entity endpoints, each represented by an [`EntityProxy`] rather than a
/// resolved [`crate::entity::Entity`] (spec.md §9 "Cyclic references" — relationships own their
/// proxies by value; entity-to-relationship lookup goes through the storage engine only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub guid: InstanceGuid,
    pub relationship_type: TypeDefSummary,
    pub status: InstanceStatus,
    pub version: InstanceVersion,
    pub create_time: InstanceTimestamp,
    pub update_time: InstanceTimestamp,
    pub provenance: Provenance,
    pub end_one: EntityProxy,
    pub end_two: EntityProxy,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Relationship {
    #[must_use]
    pub const fn version_key(&self) -> (i64, i64) {
        (self.version.as_i64(), self.relationship_type.version.as_i64())
    }

    #[must_use]
    pub fn is_reference_copy(&self, local_metadata_collection_id: MetadataCollectionId) -> bool {
        self.provenance.metadata_collection_id != local_metadata_collection_id
    }
}
