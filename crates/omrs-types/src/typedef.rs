use serde::{Deserialize, Serialize};

use crate::{ids::TypeDefGuid, timestamp::TypeVersion};

/// Which kind of schema a [`TypeDefSummary`] describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeDefCategory {
    EntityDef,
    RelationshipDef,
    ClassificationDef,
    AttributeTypeDef,
}

/// A `(GUID, name)`-keyed, versioned reference to a schema. Carried by entities and
/// relationships as their type reference, and used as the key into the local type manager
/// cache (§4.1 "mirrored into the local type manager cache").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefSummary {
    pub guid: TypeDefGuid,
    pub name: String,
    pub category: TypeDefCategory,
    pub version: TypeVersion,
}

impl TypeDefSummary {
    #[must_use]
    pub fn new(guid: TypeDefGuid, name: impl Into<String>, category: TypeDefCategory, version: TypeVersion) -> Self {
        Self {
            guid,
            name: name.into(),
            category,
            version,
        }
    }
}

/// The full schema for an entity, relationship, or classification.
///
/// The core treats this as an opaque, storage-engine-owned document for the purposes of
/// federation and event handling; only the summary fields above participate in the instance
/// lifecycle invariants (I4, I5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
    pub summary: TypeDefSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attribute_type_defs: Vec<AttributeTypeDefSummary>,
}

/// Schema for an attribute primitive (a property on an entity/relationship/classification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTypeDefSummary {
    pub guid: TypeDefGuid,
    pub name: String,
    pub version: TypeVersion,
}
