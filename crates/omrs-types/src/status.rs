use serde::{Deserialize, Serialize};

/// Lifecycle status of an entity or relationship (spec.md §3).
///
/// `DELETED` is a soft-delete: I8 requires an instance to pass through `Deleted` before it can
/// be purged (except for reference-copy purge, which is unconditional).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Draft,
    Prepared,
    Active,
    Deleted,
}

impl InstanceStatus {
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}
