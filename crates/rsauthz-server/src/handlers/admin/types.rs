//! Types for grant administration.

use chrono::{DateTime, Utc};
use rsauthz_domain::error::DomainError;
use rsauthz_storage::{Effect, StorageError};

/// Maximum number of grants accepted by a single bulk grant.
pub const MAX_BULK_SIZE: usize = 1000;

/// A role assignment to create or replace.
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role_id: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Creates an unbounded assignment.
    pub fn new(user_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id: role_id.into(),
            valid_from: None,
            valid_until: None,
        }
    }

    /// Bounds the assignment in time.
    pub fn with_window(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }
}

/// A permission to attach to a role.
#[derive(Debug, Clone)]
pub struct RolePermissionGrant {
    pub role_id: String,
    pub permission_id: String,
    pub effect: Effect,
    /// Raw condition document (e.g. `{"amount": {"$lte": 1000}}`).
    pub conditions: Option<serde_json::Value>,
}

impl RolePermissionGrant {
    /// Creates an unconditional allow.
    pub fn allow(role_id: impl Into<String>, permission_id: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
            permission_id: permission_id.into(),
            effect: Effect::Allow,
            conditions: None,
        }
    }

    /// Creates an unconditional deny.
    pub fn deny(role_id: impl Into<String>, permission_id: impl Into<String>) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(role_id, permission_id)
        }
    }

    /// Attaches conditions.
    pub fn with_conditions(mut self, conditions: serde_json::Value) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

/// A permission granted (or denied) to a user on one resource instance.
#[derive(Debug, Clone)]
pub struct ResourcePermissionGrant {
    pub user_id: String,
    pub permission_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub effect: Effect,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub conditions: Option<serde_json::Value>,
    pub priority: i32,
}

impl ResourcePermissionGrant {
    /// Creates an unbounded, unconditional grant with priority 0.
    pub fn new(
        user_id: impl Into<String>,
        permission_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            permission_id: permission_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            effect,
            valid_from: None,
            valid_until: None,
            conditions: None,
            priority: 0,
        }
    }

    /// Bounds the grant in time.
    pub fn with_window(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    /// Attaches conditions.
    pub fn with_conditions(mut self, conditions: serde_json::Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A delegation to create.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    pub delegator_id: String,
    pub delegate_id: String,
    pub permission_ids: Vec<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Errors that can occur during grant administration.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The request failed input validation; nothing was written.
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// A condition document could not be parsed; nothing was written.
    #[error("invalid conditions: {message}")]
    InvalidConditions { message: String },

    /// The actor may not perform the mutation.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// The store rejected or failed the mutation.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A permission check needed by the mutation failed.
    #[error("permission check failed: {0}")]
    Check(#[from] DomainError),
}

impl AdminError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        AdminError::Validation {
            message: message.into(),
        }
    }
}

/// Result type for administration operations.
pub type AdminResult<T> = Result<T, AdminError>;
