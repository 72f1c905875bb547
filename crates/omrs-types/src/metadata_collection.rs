use serde::{Deserialize, Serialize};

use crate::ids::MetadataCollectionId;

/// Identity of a metadata collection: the authoritative set of instances owned by one
/// repository (spec.md §3). `id` is immutable for the lifetime of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCollectionDescriptor {
    pub id: MetadataCollectionId,
    pub name: String,
}

impl MetadataCollectionDescriptor {
    #[must_use]
    pub const fn new(id: MetadataCollectionId, name: String) -> Self {
        Self { id, name }
    }
}
