//! DataStore trait definition and the persisted record types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Maximum length of any record identifier.
pub const MAX_ID_LENGTH: usize = 128;

/// Whether a stored permission row grants or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// A permission definition (`module:action`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub module: String,
    pub action: String,
    pub description: Option<String>,
    /// Inactive permissions never grant anything.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// Creates an active permission.
    pub fn new(id: impl Into<String>, module: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            action: action.into(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A role. Higher `level` means a more privileged role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub level: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Creates an active role.
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A permission attached to a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: String,
    pub permission_id: String,
    pub effect: Effect,
    /// Raw condition document, parsed by the reader.
    pub conditions: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A role held by a user, optionally time-bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: String,
    pub role_id: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub assigned_at: DateTime<Utc>,
}

/// A permission granted (or denied) to a user on one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePermission {
    pub id: String,
    pub user_id: String,
    pub permission_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub effect: Effect,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub conditions: Option<serde_json::Value>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

/// Permissions temporarily handed from one user to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: String,
    pub delegator_id: String,
    pub delegate_id: String,
    pub permission_ids: Vec<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Set once revoked; revoked delegations never grant.
    pub revoked_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A named bundle of permissions that can be applied to roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionTemplate {
    pub id: String,
    pub name: String,
    pub permission_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for reading resource permissions.
#[derive(Debug, Clone, Default)]
pub struct ResourcePermissionFilter {
    pub user_id: Option<String>,
    pub permission_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

impl ResourcePermissionFilter {
    /// Returns true if the record matches every set field.
    pub fn matches(&self, record: &ResourcePermission) -> bool {
        self.user_id.as_ref().map_or(true, |u| &record.user_id == u)
            && self
                .permission_id
                .as_ref()
                .map_or(true, |p| &record.permission_id == p)
            && self
                .resource_type
                .as_ref()
                .map_or(true, |t| &record.resource_type == t)
            && self
                .resource_id
                .as_ref()
                .map_or(true, |r| &record.resource_id == r)
    }
}

/// Validates a record identifier.
pub fn validate_id(field: &str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::InvalidInput {
            message: format!("{field} cannot be empty"),
        });
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!("{field} exceeds {MAX_ID_LENGTH} characters"),
        });
    }
    Ok(())
}

/// Validates a validity window.
pub fn validate_window(
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
) -> StorageResult<()> {
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if from > until {
            return Err(StorageError::InvalidInput {
                message: format!("valid_from ({from}) is after valid_until ({until})"),
            });
        }
    }
    Ok(())
}

/// Validates a permission's module and action.
pub fn validate_permission(permission: &Permission) -> StorageResult<()> {
    validate_id("permission id", &permission.id)?;
    for (field, value) in [("module", &permission.module), ("action", &permission.action)] {
        if value.is_empty() || value.contains(':') {
            return Err(StorageError::InvalidInput {
                message: format!("permission {field} must be non-empty and contain no ':'"),
            });
        }
    }
    Ok(())
}

/// Validates a resource permission row.
pub fn validate_resource_permission(record: &ResourcePermission) -> StorageResult<()> {
    validate_id("resource permission id", &record.id)?;
    validate_id("user id", &record.user_id)?;
    validate_id("permission id", &record.permission_id)?;
    validate_id("resource type", &record.resource_type)?;
    validate_id("resource id", &record.resource_id)?;
    validate_window(record.valid_from, record.valid_until)
}

/// Validates a delegation row.
pub fn validate_delegation(delegation: &Delegation) -> StorageResult<()> {
    validate_id("delegation id", &delegation.id)?;
    validate_id("delegator id", &delegation.delegator_id)?;
    validate_id("delegate id", &delegation.delegate_id)?;
    if delegation.delegator_id == delegation.delegate_id {
        return Err(StorageError::InvalidInput {
            message: "a user cannot delegate to themselves".to_string(),
        });
    }
    if delegation.permission_ids.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "delegation must include at least one permission".to_string(),
        });
    }
    validate_window(delegation.valid_from, delegation.valid_until)
}

/// Abstract storage interface for role and permission administration data.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations. Every mutation is atomic: it either applies fully or
/// returns an error and leaves the store unchanged.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // Permission operations

    /// Creates a permission. Fails if the id or `module:action` exists.
    async fn create_permission(&self, permission: Permission) -> StorageResult<Permission>;

    /// Gets a permission by ID.
    async fn get_permission(&self, id: &str) -> StorageResult<Permission>;

    /// Finds a permission by `module` and `action`.
    async fn find_permission(&self, module: &str, action: &str)
        -> StorageResult<Option<Permission>>;

    /// Activates or deactivates a permission.
    async fn set_permission_active(&self, id: &str, is_active: bool) -> StorageResult<Permission>;

    // Role operations

    /// Creates a role.
    async fn create_role(&self, role: Role) -> StorageResult<Role>;

    /// Gets a role by ID.
    async fn get_role(&self, id: &str) -> StorageResult<Role>;

    /// Lists the assignments of a role.
    async fn list_role_members(&self, role_id: &str) -> StorageResult<Vec<UserRole>>;

    // Role permission operations

    /// Attaches a permission to a role, replacing any existing row for the pair.
    async fn put_role_permission(&self, record: RolePermission) -> StorageResult<()>;

    /// Detaches a permission from a role. Returns false if it was not attached.
    async fn delete_role_permission(&self, role_id: &str, permission_id: &str)
        -> StorageResult<bool>;

    /// Lists the permissions attached to a role.
    async fn list_role_permissions(&self, role_id: &str) -> StorageResult<Vec<RolePermission>>;

    // User role operations

    /// Assigns a role to a user, replacing any existing assignment of the pair.
    async fn assign_role(&self, assignment: UserRole) -> StorageResult<()>;

    /// Removes a role assignment. Returns false if it did not exist.
    async fn unassign_role(&self, user_id: &str, role_id: &str) -> StorageResult<bool>;

    /// Lists a user's role assignments.
    async fn list_user_roles(&self, user_id: &str) -> StorageResult<Vec<UserRole>>;

    // Resource permission operations

    /// Writes and deletes resource permissions in one atomic step.
    ///
    /// Writes replace existing rows with the same id. Deleting an unknown id
    /// is not an error.
    async fn write_resource_permissions(
        &self,
        writes: Vec<ResourcePermission>,
        deletes: Vec<String>,
    ) -> StorageResult<()>;

    /// Gets a resource permission by ID.
    async fn get_resource_permission(&self, id: &str) -> StorageResult<ResourcePermission>;

    /// Reads resource permissions matching the filter.
    async fn read_resource_permissions(
        &self,
        filter: &ResourcePermissionFilter,
    ) -> StorageResult<Vec<ResourcePermission>>;

    // Delegation operations

    /// Creates a delegation.
    async fn create_delegation(&self, delegation: Delegation) -> StorageResult<Delegation>;

    /// Gets a delegation by ID.
    async fn get_delegation(&self, id: &str) -> StorageResult<Delegation>;

    /// Marks a delegation revoked.
    async fn revoke_delegation(&self, id: &str, at: DateTime<Utc>) -> StorageResult<Delegation>;

    /// Lists delegations (including revoked ones) to a delegate.
    async fn list_delegations_to(&self, delegate_id: &str) -> StorageResult<Vec<Delegation>>;

    // Template operations

    /// Creates a permission template.
    async fn create_template(&self, template: PermissionTemplate)
        -> StorageResult<PermissionTemplate>;

    /// Gets a permission template by ID.
    async fn get_template(&self, id: &str) -> StorageResult<PermissionTemplate>;

    /// Convenience: writes a single resource permission.
    async fn write_resource_permission(&self, record: ResourcePermission) -> StorageResult<()> {
        self.write_resource_permissions(vec![record], vec![]).await
    }
}
