//! Narrow C2/C3 contracts: structural validation of instances and construction of well-formed
//! ones. Real type-compatibility checking belongs to the type registry (C1), an external
//! collaborator this core does not reimplement; [`BasicInstanceValidator`] only checks the
//! invariants a core without a real type registry can still check on its own.

use error_stack::{ensure, Result};
use omrs_types::{
    entity::Entity, entity_proxy::EntityProxy, provenance::Provenance, relationship::Relationship,
    status::InstanceStatus, timestamp::InstanceVersion, typedef::TypeDefSummary,
};

use crate::error::InvalidEntity;

/// Structural validation of instances (C2): does the instance itself look well-formed, and is
/// its declared type version at least as new as what is already stored (I5)?
pub trait InstanceValidator: Send + Sync {
    fn validate_entity(&self, entity: &Entity) -> Result<(), InvalidEntity>;
    fn validate_relationship(&self, relationship: &Relationship) -> Result<(), InvalidEntity>;
}

/// Builds well-formed instances, including entity proxies, from caller-supplied pieces (C3),
/// mirroring spec.md §4.1's "the wrapper builds the instance via C3" external-source protocol.
pub trait InstanceFactory: Send + Sync {
    #[must_use]
    fn new_entity(
        &self,
        entity_type: TypeDefSummary,
        provenance: Provenance,
        properties: std::collections::HashMap<String, serde_json::Value>,
    ) -> Entity;

    #[must_use]
    fn proxy_for(entity: &Entity) -> EntityProxy {
        EntityProxy::new(
            entity.guid,
            entity.entity_type.clone(),
            entity.provenance.clone(),
            entity.properties.clone(),
        )
    }
}

/// Default [`InstanceValidator`] checking only what this core can verify without a real type
/// registry: non-null GUID (structurally guaranteed by [`omrs_types::ids::InstanceGuid`]'s
/// construction), a non-empty type name, and a version of at least 1.
#[derive(Debug, Default, Copy, Clone)]
pub struct BasicInstanceValidator;

impl InstanceValidator for BasicInstanceValidator {
    fn validate_entity(&self, entity: &Entity) -> Result<(), InvalidEntity> {
        validate_common(&entity.entity_type, entity.version)
    }

    fn validate_relationship(&self, relationship: &Relationship) -> Result<(), InvalidEntity> {
        validate_common(&relationship.relationship_type, relationship.version)
    }
}

fn validate_common(type_ref: &TypeDefSummary, version: InstanceVersion) -> Result<(), InvalidEntity> {
    ensure!(!type_ref.name.is_empty(), InvalidEntity);
    ensure!(version.as_i64() >= InstanceVersion::INITIAL.as_i64(), InvalidEntity);
    Ok(())
}

/// Default [`InstanceFactory`], assigning version 1 and the current timestamp to every new
/// instance, matching spec.md §3's "Creation at home" lifecycle rule.
#[derive(Debug, Default, Copy, Clone)]
pub struct BasicInstanceFactory;

impl InstanceFactory for BasicInstanceFactory {
    fn new_entity(
        &self,
        entity_type: TypeDefSummary,
        provenance: Provenance,
        properties: std::collections::HashMap<String, serde_json::Value>,
    ) -> Entity {
        let now = omrs_types::timestamp::InstanceTimestamp::now();
        Entity {
            guid: omrs_types::ids::InstanceGuid::generate(),
            entity_type,
            status: InstanceStatus::Active,
            version: InstanceVersion::INITIAL,
            create_time: now,
            update_time: now,
            provenance,
            properties,
            classifications: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use omrs_types::{ids::MetadataCollectionId, typedef::TypeDefCategory, TypeVersion};

    use super::*;

    fn sample_type() -> TypeDefSummary {
        TypeDefSummary::new(
            omrs_types::ids::TypeDefGuid::generate(),
            "DataSet",
            TypeDefCategory::EntityDef,
            TypeVersion::new(1),
        )
    }

    #[test]
    fn basic_validator_rejects_empty_type_name() {
        let factory = BasicInstanceFactory;
        let mut entity_type = sample_type();
        entity_type.name = String::new();
        let provenance = Provenance::local(MetadataCollectionId::generate(), "local".to_owned());
        let entity = factory.new_entity(entity_type, provenance, Default::default());

        let validator = BasicInstanceValidator;
        assert!(validator.validate_entity(&entity).is_err());
    }

    #[test]
    fn basic_factory_assigns_initial_version() {
        let factory = BasicInstanceFactory;
        let provenance = Provenance::local(MetadataCollectionId::generate(), "local".to_owned());
        let entity = factory.new_entity(sample_type(), provenance, Default::default());
        assert_eq!(entity.version, InstanceVersion::INITIAL);
        assert_eq!(entity.status, InstanceStatus::Active);
    }
}
