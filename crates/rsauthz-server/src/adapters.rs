//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (rsauthz-domain) reads authorization evidence through the
//! abstract `GrantStore` trait. The storage layer (rsauthz-storage) implements
//! `DataStore` with concrete backends and knows nothing about decisions.
//!
//! `DataStoreGrantStore` translates the three persisted grant sources into
//! domain [`Grant`] values:
//!
//! | Source              | Scope    | Polarity        | Window          | Priority     |
//! |---------------------|----------|-----------------|-----------------|--------------|
//! | role permission     | global   | row effect      | role assignment | role level   |
//! | resource permission | resource | row effect      | row             | row priority |
//! | delegation          | global   | allow           | delegation      | 0            |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use rsauthz_domain::condition::Conditions;
use rsauthz_domain::error::{DomainError, DomainResult};
use rsauthz_domain::model::{Grant, GrantScope, GrantSource, PermissionRef, Polarity, ResourceRef};
use rsauthz_domain::resolver::GrantStore;
use rsauthz_storage::{
    DataStore, Delegation, Effect, Permission, ResourcePermission, ResourcePermissionFilter,
    StorageError, UserRole,
};

/// Adapter that implements `GrantStore` using a `DataStore`.
pub struct DataStoreGrantStore<S: DataStore> {
    storage: Arc<S>,
}

impl<S: DataStore> DataStoreGrantStore<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    async fn role_grants(
        &self,
        subject_id: &str,
        permission: &Permission,
        permission_ref: &PermissionRef,
    ) -> DomainResult<Vec<Grant>> {
        let assignments = self
            .storage
            .list_user_roles(subject_id)
            .await
            .map_err(unavailable)?;

        let mut grants = Vec::new();
        for assignment in assignments {
            let role = match self.storage.get_role(&assignment.role_id).await {
                Ok(role) => role,
                Err(StorageError::NotFound { .. }) => {
                    warn!(
                        subject = %subject_id,
                        role_id = %assignment.role_id,
                        "skipping assignment of unknown role"
                    );
                    continue;
                }
                Err(e) => return Err(unavailable(e)),
            };
            if !role.is_active {
                continue;
            }

            let rows = self
                .storage
                .list_role_permissions(&role.id)
                .await
                .map_err(unavailable)?;
            let Some(row) = rows.into_iter().find(|r| r.permission_id == permission.id) else {
                continue;
            };

            let id = format!("role-permission:{}:{}", role.id, permission.id);
            let Some(conditions) = parse_conditions(&id, row.conditions.as_ref()) else {
                continue;
            };
            grants.push(
                role_grant(id, &assignment, permission_ref, row.effect, row.created_at)
                    .with_conditions(conditions)
                    .with_priority(role.level),
            );
        }
        Ok(grants)
    }

    async fn resource_grants(
        &self,
        subject_id: &str,
        permission: &Permission,
        permission_ref: &PermissionRef,
        resource: &ResourceRef,
    ) -> DomainResult<Vec<Grant>> {
        let filter = ResourcePermissionFilter {
            user_id: Some(subject_id.to_string()),
            permission_id: Some(permission.id.clone()),
            resource_type: Some(resource.resource_type.clone()),
            resource_id: Some(resource.resource_id.clone()),
        };
        let rows = self
            .storage
            .read_resource_permissions(&filter)
            .await
            .map_err(unavailable)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| resource_grant(row, permission_ref))
            .collect())
    }

    async fn delegation_grants(
        &self,
        subject_id: &str,
        permission: &Permission,
        permission_ref: &PermissionRef,
    ) -> DomainResult<Vec<Grant>> {
        let delegations = self
            .storage
            .list_delegations_to(subject_id)
            .await
            .map_err(unavailable)?;

        Ok(delegations
            .into_iter()
            .filter(|d| d.revoked_at.is_none() && d.permission_ids.contains(&permission.id))
            .map(|d| delegation_grant(d, permission_ref))
            .collect())
    }
}

#[async_trait]
impl<S: DataStore> GrantStore for DataStoreGrantStore<S> {
    async fn fetch_candidate_grants(
        &self,
        subject_id: &str,
        permission: &PermissionRef,
        resource: Option<&ResourceRef>,
    ) -> DomainResult<Vec<Grant>> {
        let stored = self
            .storage
            .find_permission(&permission.module, &permission.action)
            .await
            .map_err(unavailable)?;
        let Some(stored) = stored else {
            debug!(permission = %permission, "unknown permission");
            return Ok(Vec::new());
        };
        if !stored.is_active {
            debug!(permission = %permission, "permission is inactive");
            return Ok(Vec::new());
        }

        let mut grants = self.role_grants(subject_id, &stored, permission).await?;
        if let Some(resource) = resource {
            grants.extend(
                self.resource_grants(subject_id, &stored, permission, resource)
                    .await?,
            );
        }
        grants.extend(
            self.delegation_grants(subject_id, &stored, permission)
                .await?,
        );
        Ok(grants)
    }
}

fn unavailable(error: StorageError) -> DomainError {
    DomainError::StoreUnavailable {
        message: format!("storage error: {error}"),
    }
}

fn polarity(effect: Effect) -> Polarity {
    match effect {
        Effect::Allow => Polarity::Allow,
        Effect::Deny => Polarity::Deny,
    }
}

/// Parses a stored condition document, returning `None` (and logging) when it is malformed.
fn parse_conditions(grant_id: &str, raw: Option<&serde_json::Value>) -> Option<Conditions> {
    let Some(raw) = raw else {
        return Some(Conditions::default());
    };
    match Conditions::from_json(raw) {
        Ok(conditions) => Some(conditions),
        Err(e) => {
            warn!(grant_id = %grant_id, error = %e, "skipping grant with malformed conditions");
            None
        }
    }
}

fn role_grant(
    id: String,
    assignment: &UserRole,
    permission: &PermissionRef,
    effect: Effect,
    created_at: DateTime<Utc>,
) -> Grant {
    Grant::new(
        id,
        assignment.user_id.clone(),
        permission.clone(),
        GrantScope::Global,
        polarity(effect),
        GrantSource::Role,
        created_at,
    )
    .with_window(assignment.valid_from, assignment.valid_until)
}

fn resource_grant(row: ResourcePermission, permission: &PermissionRef) -> Option<Grant> {
    let conditions = parse_conditions(&row.id, row.conditions.as_ref())?;
    Some(
        Grant::new(
            row.id,
            row.user_id,
            permission.clone(),
            GrantScope::Resource(ResourceRef::new(row.resource_type, row.resource_id)),
            polarity(row.effect),
            GrantSource::DirectResource,
            row.created_at,
        )
        .with_window(row.valid_from, row.valid_until)
        .with_conditions(conditions)
        .with_priority(row.priority),
    )
}

fn delegation_grant(delegation: Delegation, permission: &PermissionRef) -> Grant {
    Grant::new(
        format!("delegation:{}", delegation.id),
        delegation.delegate_id,
        permission.clone(),
        GrantScope::Global,
        Polarity::Allow,
        GrantSource::Delegation,
        delegation.created_at,
    )
    .with_window(delegation.valid_from, delegation.valid_until)
}
