//! Types for the permission engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::condition::ConditionContext;
use crate::model::{PermissionRef, ResourceRef};

/// Request for a permission check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// The subject (user) identifier.
    pub subject_id: String,
    /// The permission to check (e.g., `document:READ`).
    pub permission: PermissionRef,
    /// The resource instance, for resource-scoped checks.
    pub resource: Option<ResourceRef>,
    /// Variables for condition evaluation.
    /// Wrapped in Arc for cheap cloning.
    pub context: Arc<ConditionContext>,
    /// Evaluate as of this instant instead of the current time.
    pub at: Option<DateTime<Utc>>,
}

impl CheckRequest {
    /// Creates a global (resource-less) check without context.
    pub fn new(subject_id: impl Into<String>, permission: PermissionRef) -> Self {
        Self {
            subject_id: subject_id.into(),
            permission,
            resource: None,
            context: Arc::new(ConditionContext::new()),
            at: None,
        }
    }

    /// Scopes the check to a resource instance.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource = Some(ResourceRef::new(resource_type, resource_id));
        self
    }

    /// Supplies the condition evaluation context.
    pub fn with_context(mut self, context: ConditionContext) -> Self {
        self.context = Arc::new(context);
        self
    }

    /// Evaluates the check at a fixed instant.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}
