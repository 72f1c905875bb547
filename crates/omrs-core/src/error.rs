//! Error taxonomy (spec.md §7), one unit-struct `Context` per kind, following the storage
//! crate's convention of a plain `#[derive(Debug)]` marker type plus a hand-written `Display`.
//!
//! Every fallible operation in this crate returns `error_stack::Result<T, K>` for the specific
//! kind `K` it can fail with, rather than one mega-enum; callers attach parameter names, GUIDs
//! and other context with `.attach_printable(...)` at the call site.

use core::fmt;

use error_stack::Context;

/// Convenience alias for the crate's prevailing error-handling shape.
pub type OmrsResult<T, C> = error_stack::Result<T, C>;

macro_rules! error_kind {
    ($name:ident, $display:literal) => {
        #[derive(Debug)]
        #[must_use]
        pub struct $name;

        impl fmt::Display for $name {
            fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt.write_str($display)
            }
        }

        impl Context for $name {}
    };
}

error_kind!(InvalidParameter, "a required parameter was null or out of range");
error_kind!(UserNotAuthorized, "the actor is not authorized to perform this operation");
error_kind!(RepositoryError, "the storage engine reported an I/O failure");
error_kind!(EntityNotKnown, "no entity is known for the given GUID");
error_kind!(EntityProxyOnly, "only an entity proxy is stored locally for the given GUID");
error_kind!(EntityNotDeleted, "the entity must be soft-deleted before this operation is legal");
error_kind!(EntityConflict, "the entity update conflicts with the currently stored version");
error_kind!(HomeEntity, "this operation is only legal on a locally-homed entity");
error_kind!(InvalidEntity, "the entity failed structural validation");
error_kind!(RelationshipNotKnown, "no relationship is known for the given GUID");
error_kind!(
    RelationshipNotDeleted,
    "the relationship must be soft-deleted before this operation is legal"
);
error_kind!(
    RelationshipConflict,
    "the relationship update conflicts with the currently stored version"
);
error_kind!(HomeRelationship, "this operation is only legal on a locally-homed relationship");
error_kind!(InvalidRelationship, "the relationship failed structural validation");
error_kind!(PropertyError, "a property value did not satisfy its attribute type def");
error_kind!(ClassificationError, "a classification could not be applied or removed");
error_kind!(StatusNotSupported, "the requested status transition is not supported");
error_kind!(PagingError, "the paging parameters are invalid");
error_kind!(
    FunctionNotSupported,
    "the storage engine does not support this optional capability"
);
error_kind!(LogicError, "an internal invariant was violated");
error_kind!(NoRepositories, "no connectors are registered with the federator");
error_kind!(NoHomeForInstance, "no registered connector matches this instance's home");

/// The fine-grained reason within [`TypeDefError`], folded into one context type because all
/// variants share identical propagation semantics (skip-on-federated-read, surface-on-write).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypeDefErrorKind {
    TypeError,
    InvalidTypeDef,
    TypeDefNotKnown,
    TypeDefConflict,
    TypeDefInUse,
    TypeDefNotSupported,
    PatchError,
}

impl fmt::Display for TypeDefErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TypeError => "type error",
            Self::InvalidTypeDef => "invalid type definition",
            Self::TypeDefNotKnown => "type definition not known",
            Self::TypeDefConflict => "type definition conflict",
            Self::TypeDefInUse => "type definition is in use",
            Self::TypeDefNotSupported => "type definition operation not supported",
            Self::PatchError => "patch could not be applied to type definition",
        };
        fmt.write_str(text)
    }
}

#[derive(Debug)]
#[must_use]
pub struct TypeDefError(pub TypeDefErrorKind);

impl fmt::Display for TypeDefError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "type registry failure: {}", self.0)
    }
}

impl Context for TypeDefError {}

/// A response-envelope-facing HTTP status hint (spec.md §6's `relatedHTTPCode`), kept separate
/// from `Context` since most kinds never cross a transport boundary in this core.
#[must_use]
pub fn http_status_hint_for(kind: &str) -> u16 {
    match kind {
        "InvalidParameter" | "PagingError" | "PropertyError" | "ClassificationError" => 400,
        "UserNotAuthorized" => 403,
        "EntityNotKnown" | "RelationshipNotKnown" => 404,
        "EntityConflict" | "RelationshipConflict" | "StatusNotSupported" => 409,
        "FunctionNotSupported" => 501,
        _ => 500,
    }
}
