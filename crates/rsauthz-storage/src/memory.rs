//! In-memory storage implementation for testing and embedded use.
//!
//! Every collection lives in its own `DashMap`, so operations on different
//! users or roles never contend on a common lock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    validate_delegation, validate_id, validate_permission, validate_resource_permission,
    validate_window, DataStore, Delegation, Permission, PermissionTemplate, ResourcePermission,
    ResourcePermissionFilter, Role, RolePermission, UserRole,
};

/// In-memory implementation of DataStore.
///
/// # Performance Characteristics
///
/// - **Point lookups** (permission, role, grant by id): O(1) (DashMap lookup)
/// - **User roles / role permissions**: O(K) in the user's or role's rows
/// - **Role members**: O(U) over all users with assignments
/// - **Resource permission reads**: O(N) linear scan with filtering
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    permissions: DashMap<String, Permission>,
    /// `(module, action)` -> permission id, for uniqueness and lookup.
    permission_index: DashMap<(String, String), String>,
    roles: DashMap<String, Role>,
    /// role id -> attached permissions.
    role_permissions: DashMap<String, Vec<RolePermission>>,
    /// user id -> role assignments.
    user_roles: DashMap<String, Vec<UserRole>>,
    resource_permissions: DashMap<String, ResourcePermission>,
    delegations: DashMap<String, Delegation>,
    templates: DashMap<String, PermissionTemplate>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn ensure_permission(&self, id: &str) -> StorageResult<()> {
        if self.permissions.contains_key(id) {
            Ok(())
        } else {
            Err(StorageError::not_found("permission", id))
        }
    }

    fn ensure_role(&self, id: &str) -> StorageResult<()> {
        if self.roles.contains_key(id) {
            Ok(())
        } else {
            Err(StorageError::not_found("role", id))
        }
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    #[instrument(skip(self, permission), fields(permission_id = %permission.id))]
    async fn create_permission(&self, permission: Permission) -> StorageResult<Permission> {
        validate_permission(&permission)?;

        let index_key = (permission.module.clone(), permission.action.clone());
        // Claim the id first, then the module:action pair; roll back on conflict.
        match self.permissions.entry(permission.id.clone()) {
            Entry::Occupied(_) => {
                return Err(StorageError::AlreadyExists {
                    kind: "permission",
                    id: permission.id,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(permission.clone());
            }
        }
        match self.permission_index.entry(index_key) {
            Entry::Occupied(_) => {
                self.permissions.remove(&permission.id);
                Err(StorageError::AlreadyExists {
                    kind: "permission",
                    id: format!("{}:{}", permission.module, permission.action),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(permission.id.clone());
                Ok(permission)
            }
        }
    }

    async fn get_permission(&self, id: &str) -> StorageResult<Permission> {
        self.permissions
            .get(id)
            .map(|p| p.value().clone())
            .ok_or_else(|| StorageError::not_found("permission", id))
    }

    async fn find_permission(
        &self,
        module: &str,
        action: &str,
    ) -> StorageResult<Option<Permission>> {
        let id = self
            .permission_index
            .get(&(module.to_string(), action.to_string()))
            .map(|id| id.value().clone());
        Ok(id.and_then(|id| self.permissions.get(&id).map(|p| p.value().clone())))
    }

    async fn set_permission_active(&self, id: &str, is_active: bool) -> StorageResult<Permission> {
        let mut entry = self
            .permissions
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("permission", id))?;
        entry.is_active = is_active;
        Ok(entry.clone())
    }

    async fn create_role(&self, role: Role) -> StorageResult<Role> {
        validate_id("role id", &role.id)?;
        if role.name.trim().is_empty() {
            return Err(StorageError::InvalidInput {
                message: "role name cannot be empty".to_string(),
            });
        }

        match self.roles.entry(role.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                kind: "role",
                id: role.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(role.clone());
                Ok(role)
            }
        }
    }

    async fn get_role(&self, id: &str) -> StorageResult<Role> {
        self.roles
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::not_found("role", id))
    }

    async fn list_role_members(&self, role_id: &str) -> StorageResult<Vec<UserRole>> {
        self.ensure_role(role_id)?;
        Ok(self
            .user_roles
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|a| a.role_id == role_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    #[instrument(skip(self, record), fields(role_id = %record.role_id, permission_id = %record.permission_id))]
    async fn put_role_permission(&self, record: RolePermission) -> StorageResult<()> {
        self.ensure_role(&record.role_id)?;
        self.ensure_permission(&record.permission_id)?;

        let mut rows = self.role_permissions.entry(record.role_id.clone()).or_default();
        rows.retain(|r| r.permission_id != record.permission_id);
        rows.push(record);
        Ok(())
    }

    async fn delete_role_permission(
        &self,
        role_id: &str,
        permission_id: &str,
    ) -> StorageResult<bool> {
        let Some(mut rows) = self.role_permissions.get_mut(role_id) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| r.permission_id != permission_id);
        Ok(rows.len() != before)
    }

    async fn list_role_permissions(&self, role_id: &str) -> StorageResult<Vec<RolePermission>> {
        Ok(self
            .role_permissions
            .get(role_id)
            .map(|rows| rows.value().clone())
            .unwrap_or_default())
    }

    #[instrument(skip(self, assignment), fields(user_id = %assignment.user_id, role_id = %assignment.role_id))]
    async fn assign_role(&self, assignment: UserRole) -> StorageResult<()> {
        validate_id("user id", &assignment.user_id)?;
        validate_window(assignment.valid_from, assignment.valid_until)?;
        self.ensure_role(&assignment.role_id)?;

        let mut rows = self.user_roles.entry(assignment.user_id.clone()).or_default();
        rows.retain(|r| r.role_id != assignment.role_id);
        rows.push(assignment);
        Ok(())
    }

    async fn unassign_role(&self, user_id: &str, role_id: &str) -> StorageResult<bool> {
        let Some(mut rows) = self.user_roles.get_mut(user_id) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| r.role_id != role_id);
        Ok(rows.len() != before)
    }

    async fn list_user_roles(&self, user_id: &str) -> StorageResult<Vec<UserRole>> {
        Ok(self
            .user_roles
            .get(user_id)
            .map(|rows| rows.value().clone())
            .unwrap_or_default())
    }

    async fn write_resource_permissions(
        &self,
        writes: Vec<ResourcePermission>,
        deletes: Vec<String>,
    ) -> StorageResult<()> {
        // Validate everything before touching the map so a bad row leaves the
        // store unchanged.
        for record in &writes {
            validate_resource_permission(record)?;
            self.ensure_permission(&record.permission_id)?;
        }

        for id in deletes {
            self.resource_permissions.remove(&id);
        }
        for record in writes {
            self.resource_permissions.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn get_resource_permission(&self, id: &str) -> StorageResult<ResourcePermission> {
        self.resource_permissions
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::not_found("resource permission", id))
    }

    async fn read_resource_permissions(
        &self,
        filter: &ResourcePermissionFilter,
    ) -> StorageResult<Vec<ResourcePermission>> {
        let mut rows: Vec<ResourcePermission> = self
            .resource_permissions
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    #[instrument(skip(self, delegation), fields(delegation_id = %delegation.id))]
    async fn create_delegation(&self, delegation: Delegation) -> StorageResult<Delegation> {
        validate_delegation(&delegation)?;
        for permission_id in &delegation.permission_ids {
            self.ensure_permission(permission_id)?;
        }

        match self.delegations.entry(delegation.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                kind: "delegation",
                id: delegation.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(delegation.clone());
                Ok(delegation)
            }
        }
    }

    async fn get_delegation(&self, id: &str) -> StorageResult<Delegation> {
        self.delegations
            .get(id)
            .map(|d| d.value().clone())
            .ok_or_else(|| StorageError::not_found("delegation", id))
    }

    async fn revoke_delegation(&self, id: &str, at: DateTime<Utc>) -> StorageResult<Delegation> {
        let mut entry = self
            .delegations
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("delegation", id))?;
        // The first revocation time is kept.
        entry.revoked_at.get_or_insert(at);
        Ok(entry.clone())
    }

    async fn list_delegations_to(&self, delegate_id: &str) -> StorageResult<Vec<Delegation>> {
        Ok(self
            .delegations
            .iter()
            .filter(|d| d.delegate_id == delegate_id)
            .map(|d| d.value().clone())
            .collect())
    }

    async fn create_template(
        &self,
        template: PermissionTemplate,
    ) -> StorageResult<PermissionTemplate> {
        validate_id("template id", &template.id)?;
        for permission_id in &template.permission_ids {
            self.ensure_permission(permission_id)?;
        }

        match self.templates.entry(template.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                kind: "template",
                id: template.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(template.clone());
                Ok(template)
            }
        }
    }

    async fn get_template(&self, id: &str) -> StorageResult<PermissionTemplate> {
        self.templates
            .get(id)
            .map(|t| t.value().clone())
            .ok_or_else(|| StorageError::not_found("template", id))
    }
}
