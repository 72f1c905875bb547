use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ids::InstanceGuid, provenance::Provenance, typedef::TypeDefSummary};

/// A stub standing in for an entity that cannot be materialized locally: enough identity and
/// unique-key properties to display and to serve as a relationship endpoint (spec.md §3,
/// "Cyclic references" in §9 — relationships own their two proxies by value rather than
/// resolving a closed object graph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProxy {
    pub guid: InstanceGuid,
    pub entity_type: TypeDefSummary,
    pub provenance: Provenance,
    /// The subset of properties that uniquely identify the entity, enough to display it without
    /// fetching the full record.
    #[serde(default)]
    pub unique_properties: HashMap<String, serde_json::Value>,
}

impl EntityProxy {
    #[must_use]
    pub fn new(
        guid: InstanceGuid,
        entity_type: TypeDefSummary,
        provenance: Provenance,
        unique_properties: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            guid,
            entity_type,
            provenance,
            unique_properties,
        }
    }
}
