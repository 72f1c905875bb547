use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::typedef::TypeDefSummary;

/// A typed, named property bundle attached to exactly one entity.
///
/// Unlike [`crate::entity::Entity`] or [`crate::relationship::Relationship`], a classification
/// is not independently identified: it has no GUID and no provenance of its own, only a type
/// and a property map, per spec.md §3's definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub classification_type: TypeDefSummary,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Classification {
    #[must_use]
    pub fn new(classification_type: TypeDefSummary) -> Self {
        Self {
            classification_type,
            properties: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_properties(
        classification_type: TypeDefSummary,
        properties: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            classification_type,
            properties,
        }
    }
}
