use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    classification::Classification,
    ids::InstanceGuid,
    provenance::Provenance,
    status::InstanceStatus,
    timestamp::{InstanceTimestamp, InstanceVersion},
    typedef::TypeDefSummary,
};

/// A typed metadata object identified by a globally unique identifier (spec.md §3, I1).
///
/// `entity_type.version` is the type version the instance was last stored against; it is what
/// I5 compares against an incoming instance's type version on reference-copy update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub guid: InstanceGuid,
    pub entity_type: TypeDefSummary,
    pub status: InstanceStatus,
    pub version: InstanceVersion,
    pub create_time: InstanceTimestamp,
    pub update_time: InstanceTimestamp,
    pub provenance: Provenance,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
}

impl Entity {
    /// The `(version, typeVersion)` pair used by the federator's merge tie-break and the event
    /// processor's I4/I5 comparisons (spec.md §9 "merge policy during federated paged reads").
    #[must_use]
    pub const fn version_key(&self) -> (i64, i64) {
        (self.version.as_i64(), self.entity_type.version.as_i64())
    }

    #[must_use]
    pub fn is_reference_copy(&self, local_metadata_collection_id: crate::ids::MetadataCollectionId) -> bool {
        self.provenance.metadata_collection_id != local_metadata_collection_id
    }
}
