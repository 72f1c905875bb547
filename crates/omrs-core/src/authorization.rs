//! The security verifier (C4): a narrow, external collaborator the wrapper consults before
//! delegating to storage. Modeled the way the storage crate threads `AuthorizationApi` through
//! every store call rather than relying on ambient/thread-local state, so "authorize via C4" is
//! part of the call signature every operation must satisfy, not a convention callers could skip.

use async_trait::async_trait;
use error_stack::Result;
use omrs_types::AccountId;

use crate::error::UserNotAuthorized;

/// The operation an actor is attempting, passed to [`SecurityVerifier::check_authorized`] so a
/// real implementation can apply per-operation policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadInstance,
    WriteInstance,
    DeleteInstance,
    PurgeInstance,
    ManageTypeDef,
    ManageReferenceCopy,
}

/// The narrow contract C7 and C8 consult before touching storage (C4 in spec.md §4.1).
///
/// This core ships no concrete implementation beyond [`AllowAll`], which exists for tests and
/// for cohort members that delegate authorization entirely to an upstream gateway.
#[async_trait]
pub trait SecurityVerifier: Send + Sync {
    async fn check_authorized(&self, actor: AccountId, operation: Operation) -> Result<(), UserNotAuthorized>;
}

/// A verifier that authorizes every actor for every operation.
#[derive(Debug, Default, Copy, Clone)]
pub struct AllowAll;

#[async_trait]
impl SecurityVerifier for AllowAll {
    async fn check_authorized(&self, _actor: AccountId, _operation: Operation) -> Result<(), UserNotAuthorized> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_authorizes_every_operation() {
        let verifier = AllowAll;
        let actor = AccountId::generate();
        for operation in [
            Operation::ReadInstance,
            Operation::WriteInstance,
            Operation::DeleteInstance,
            Operation::PurgeInstance,
            Operation::ManageTypeDef,
            Operation::ManageReferenceCopy,
        ] {
            verifier
                .check_authorized(actor, operation)
                .await
                .expect("AllowAll must authorize every operation");
        }
    }
}
