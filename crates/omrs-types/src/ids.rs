use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub const fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(fmt, "{}", &self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_uuid_id!(
    MetadataCollectionId,
    "Immutable identifier of a metadata collection, the authoritative home of a set of instances."
);
define_uuid_id!(
    InstanceGuid,
    "Globally unique identifier of an entity or relationship instance (I1)."
);
define_uuid_id!(TypeDefGuid, "Globally unique identifier of a TypeDef or AttributeTypeDef.");
define_uuid_id!(
    AccountId,
    "Identifier of the actor on whose behalf an operation is performed, passed to the security verifier (C4)."
);
