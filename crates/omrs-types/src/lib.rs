//! Wire and in-memory data model for an OMRS-style cohort: entities, relationships, proxies,
//! classifications, type definitions and the cohort event envelope.
//!
//! This crate is pure data: it has no opinion on storage, authorization or transport. Those
//! live in `omrs-core`.

pub mod classification;
pub mod entity;
pub mod entity_proxy;
pub mod events;
pub mod ids;
pub mod metadata_collection;
pub mod provenance;
pub mod relationship;
pub mod status;
pub mod timestamp;
pub mod typedef;

pub use classification::Classification;
pub use entity::Entity;
pub use entity_proxy::EntityProxy;
pub use events::{CohortEventEnvelope, CohortEventType, InstanceGraph, InstanceSummary, Originator};
pub use ids::{AccountId, InstanceGuid, MetadataCollectionId, TypeDefGuid};
pub use metadata_collection::MetadataCollectionDescriptor;
pub use provenance::{InstanceProvenanceType, Provenance};
pub use relationship::Relationship;
pub use status::InstanceStatus;
pub use timestamp::{InstanceTimestamp, InstanceVersion, TypeVersion};
pub use typedef::{AttributeTypeDefSummary, TypeDef, TypeDefCategory, TypeDefSummary};
