use serde::{Deserialize, Serialize};

use crate::ids::MetadataCollectionId;

/// The origin category of an instance (I3).
///
/// Every instance that leaves the local repository wrapper's boundary carries exactly one of
/// these, alongside a non-null home collection id and name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceProvenanceType {
    /// Created at, and owned by, this metadata collection.
    LocalCohort,
    /// Sourced from an external system and replicated into the cohort through a delegate home.
    ExternalSource,
    /// The home collection has left the cohort; the instance is retained as a tombstoned
    /// reference copy.
    Deregistered,
    /// Loaded from static configuration rather than created through a cohort interaction.
    Configuration,
}

/// Provenance carried by every entity and relationship (I3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub metadata_collection_id: MetadataCollectionId,
    pub metadata_collection_name: String,
    pub provenance_type: InstanceProvenanceType,
    /// Set when an externally-sourced instance is replicated through a local delegate home.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated_by: Option<MetadataCollectionId>,
}

impl Provenance {
    #[must_use]
    pub const fn local(
        metadata_collection_id: MetadataCollectionId,
        metadata_collection_name: String,
    ) -> Self {
        Self {
            metadata_collection_id,
            metadata_collection_name,
            provenance_type: InstanceProvenanceType::LocalCohort,
            replicated_by: None,
        }
    }

    #[must_use]
    pub const fn external(
        external_source_id: MetadataCollectionId,
        external_source_name: String,
        replicated_by: MetadataCollectionId,
    ) -> Self {
        Self {
            metadata_collection_id: external_source_id,
            metadata_collection_name: external_source_name,
            provenance_type: InstanceProvenanceType::ExternalSource,
            replicated_by: Some(replicated_by),
        }
    }

    /// The collection that should be treated as "home" for routing purposes: the `replicatedBy`
    /// delegate if one is set, otherwise `metadataCollectionId` itself.
    #[must_use]
    pub fn routing_home(&self) -> MetadataCollectionId {
        self.replicated_by.unwrap_or(self.metadata_collection_id)
    }
}
