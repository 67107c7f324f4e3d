//! Traits for the grant data the engine reads.

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::{Grant, PermissionRef, ResourceRef};

/// Read-only source of authorization evidence.
///
/// Implementations translate persistence rows into [`Grant`] values. They
/// return every potentially relevant grant and apply no precedence.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Fetches the candidate grants for a check.
    ///
    /// Must include:
    /// - role grants (global scope) for every role the subject holds whose
    ///   permission set contains `permission`
    /// - direct grants scoped to exactly `resource` (literal id match)
    /// - non-revoked delegations to the subject covering `permission`
    ///
    /// Must exclude grants whose permission is inactive.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` when the backing persistence
    /// cannot answer. An empty list always means "no grants".
    async fn fetch_candidate_grants(
        &self,
        subject_id: &str,
        permission: &PermissionRef,
        resource: Option<&ResourceRef>,
    ) -> DomainResult<Vec<Grant>>;
}
