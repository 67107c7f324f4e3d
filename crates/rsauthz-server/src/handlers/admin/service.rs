//! Grant administration service implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use rsauthz_domain::condition::Conditions;
use rsauthz_domain::model::{PermissionRef, ResourceRef};
use rsauthz_domain::resolver::{CheckRequest, GrantStore, PermissionEngine};
use rsauthz_storage::{
    DataStore, Delegation, Effect, Permission, ResourcePermission, ResourcePermissionFilter,
    RolePermission, UserRole,
};

use super::types::{
    AdminError, AdminResult, DelegationRequest, ResourcePermissionGrant, RoleAssignment,
    RolePermissionGrant, MAX_BULK_SIZE,
};
use crate::logging::AUDIT_TARGET;

/// Cached decisions to drop once a mutation has committed.
#[derive(Debug)]
enum Invalidation {
    Subjects(BTreeSet<String>),
    All,
}

impl Invalidation {
    fn subject(subject_id: &str) -> Self {
        Invalidation::Subjects(BTreeSet::from([subject_id.to_string()]))
    }

    fn subjects<I, T>(subjects: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Invalidation::Subjects(subjects.into_iter().map(Into::into).collect())
    }
}

/// Performs grant mutations and keeps the permission engine consistent.
///
/// Every operation runs the same three steps:
/// 1. **Pre-hook**: validate the input; nothing is written on failure
/// 2. **Commit**: apply the mutation through the `DataStore`
/// 3. **Post-hook**: emit one audit event under [`AUDIT_TARGET`] and drop
///    the cached decisions of every affected subject
///
/// The decision cache is only safe to enable when every grant mutation goes
/// through this service.
pub struct GrantAdministration<S, G>
where
    S: DataStore,
    G: GrantStore,
{
    store: Arc<S>,
    engine: Arc<PermissionEngine<G>>,
}

impl<S, G> GrantAdministration<S, G>
where
    S: DataStore,
    G: GrantStore + 'static,
{
    /// Creates a new administration service.
    pub fn new(store: Arc<S>, engine: Arc<PermissionEngine<G>>) -> Self {
        Self { store, engine }
    }

    /// Returns the engine this service invalidates.
    pub fn engine(&self) -> &Arc<PermissionEngine<G>> {
        &self.engine
    }

    // ---------------------------------------------------------------------
    // Role assignments
    // ---------------------------------------------------------------------

    /// Assigns a role to a user, replacing any existing assignment of the pair.
    #[instrument(
        skip(self, assignment),
        fields(user = %assignment.user_id, role = %assignment.role_id)
    )]
    pub async fn assign_role(&self, actor: &str, assignment: RoleAssignment) -> AdminResult<()> {
        require_actor(actor)?;
        require("user id", &assignment.user_id)?;
        require("role id", &assignment.role_id)?;
        require_window(assignment.valid_from, assignment.valid_until)?;

        self.store
            .assign_role(UserRole {
                user_id: assignment.user_id.clone(),
                role_id: assignment.role_id.clone(),
                valid_from: assignment.valid_from,
                valid_until: assignment.valid_until,
                assigned_at: Utc::now(),
            })
            .await?;

        self.committed(
            actor,
            "assign_role",
            &format!("{}:{}", assignment.user_id, assignment.role_id),
            Invalidation::subject(&assignment.user_id),
        )
        .await;
        Ok(())
    }

    /// Removes a role from a user. Returns false if it was not assigned.
    #[instrument(skip(self))]
    pub async fn unassign_role(
        &self,
        actor: &str,
        user_id: &str,
        role_id: &str,
    ) -> AdminResult<bool> {
        require_actor(actor)?;
        require("user id", user_id)?;
        require("role id", role_id)?;

        let removed = self.store.unassign_role(user_id, role_id).await?;
        if removed {
            self.committed(
                actor,
                "unassign_role",
                &format!("{user_id}:{role_id}"),
                Invalidation::subject(user_id),
            )
            .await;
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Role permissions
    // ---------------------------------------------------------------------

    /// Attaches a permission to a role, replacing any existing row for the pair.
    ///
    /// Invalidates every member of the role.
    #[instrument(
        skip(self, grant),
        fields(role = %grant.role_id, permission = %grant.permission_id)
    )]
    pub async fn grant_role_permission(
        &self,
        actor: &str,
        grant: RolePermissionGrant,
    ) -> AdminResult<()> {
        require_actor(actor)?;
        require("role id", &grant.role_id)?;
        require("permission id", &grant.permission_id)?;
        require_conditions(grant.conditions.as_ref())?;

        self.store
            .put_role_permission(RolePermission {
                role_id: grant.role_id.clone(),
                permission_id: grant.permission_id.clone(),
                effect: grant.effect,
                conditions: grant.conditions,
                created_at: Utc::now(),
            })
            .await?;

        let members = self.role_members(&grant.role_id).await;
        self.committed(
            actor,
            "grant_role_permission",
            &format!("{}:{}", grant.role_id, grant.permission_id),
            members,
        )
        .await;
        Ok(())
    }

    /// Detaches a permission from a role. Returns false if it was not attached.
    #[instrument(skip(self))]
    pub async fn revoke_role_permission(
        &self,
        actor: &str,
        role_id: &str,
        permission_id: &str,
    ) -> AdminResult<bool> {
        require_actor(actor)?;
        require("role id", role_id)?;
        require("permission id", permission_id)?;

        let removed = self
            .store
            .delete_role_permission(role_id, permission_id)
            .await?;
        if removed {
            let members = self.role_members(role_id).await;
            self.committed(
                actor,
                "revoke_role_permission",
                &format!("{role_id}:{permission_id}"),
                members,
            )
            .await;
        }
        Ok(removed)
    }

    /// Attaches every permission of a template to a role as unconditional allows.
    ///
    /// The role and every permission are checked before the first row is
    /// written. Rows are written one at a time: if a write fails, the rows
    /// already written stay, their members are invalidated and the error is
    /// returned. Returns the number of permissions applied.
    #[instrument(skip(self))]
    pub async fn apply_template(
        &self,
        actor: &str,
        template_id: &str,
        role_id: &str,
    ) -> AdminResult<usize> {
        require_actor(actor)?;
        require("template id", template_id)?;
        require("role id", role_id)?;

        let template = self.store.get_template(template_id).await?;
        self.store.get_role(role_id).await?;
        for permission_id in &template.permission_ids {
            self.store.get_permission(permission_id).await?;
        }

        let now = Utc::now();
        let mut applied = 0;
        let mut failure = None;
        for permission_id in &template.permission_ids {
            let written = self
                .store
                .put_role_permission(RolePermission {
                    role_id: role_id.to_string(),
                    permission_id: permission_id.clone(),
                    effect: Effect::Allow,
                    conditions: None,
                    created_at: now,
                })
                .await;
            match written {
                Ok(()) => applied += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Rows written before a failure stay committed and still need the post-hook.
        if applied > 0 {
            let members = self.role_members(role_id).await;
            self.committed(
                actor,
                "apply_template",
                &format!(
                    "{template_id}:{role_id} ({applied}/{} applied)",
                    template.permission_ids.len()
                ),
                members,
            )
            .await;
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(applied),
        }
    }

    // ---------------------------------------------------------------------
    // Resource permissions
    // ---------------------------------------------------------------------

    /// Grants (or denies) a permission on one resource instance.
    #[instrument(
        skip(self, grant),
        fields(user = %grant.user_id, permission = %grant.permission_id)
    )]
    pub async fn grant_resource_permission(
        &self,
        actor: &str,
        grant: ResourcePermissionGrant,
    ) -> AdminResult<ResourcePermission> {
        require_actor(actor)?;
        validate_resource_grant(&grant)?;

        let record = new_resource_permission(grant, Utc::now());
        self.store.write_resource_permission(record.clone()).await?;

        self.committed(
            actor,
            "grant_resource_permission",
            &record.id,
            Invalidation::subject(&record.user_id),
        )
        .await;
        Ok(record)
    }

    /// Replaces the contents of an existing resource permission, keeping its id
    /// and creation time.
    #[instrument(skip(self, grant))]
    pub async fn update_resource_permission(
        &self,
        actor: &str,
        id: &str,
        grant: ResourcePermissionGrant,
    ) -> AdminResult<ResourcePermission> {
        require_actor(actor)?;
        require("resource permission id", id)?;
        validate_resource_grant(&grant)?;

        let existing = self.store.get_resource_permission(id).await?;
        let record = ResourcePermission {
            id: existing.id.clone(),
            ..new_resource_permission(grant, existing.created_at)
        };
        self.store.write_resource_permission(record.clone()).await?;

        self.committed(
            actor,
            "update_resource_permission",
            id,
            Invalidation::subjects([existing.user_id, record.user_id.clone()]),
        )
        .await;
        Ok(record)
    }

    /// Deletes a resource permission.
    #[instrument(skip(self))]
    pub async fn revoke_resource_permission(&self, actor: &str, id: &str) -> AdminResult<()> {
        require_actor(actor)?;
        require("resource permission id", id)?;

        let existing = self.store.get_resource_permission(id).await?;
        self.store
            .write_resource_permissions(vec![], vec![existing.id.clone()])
            .await?;

        self.committed(
            actor,
            "revoke_resource_permission",
            id,
            Invalidation::subject(&existing.user_id),
        )
        .await;
        Ok(())
    }

    /// Grants many resource permissions in one atomic write.
    ///
    /// Either every grant is written or none is.
    #[instrument(skip(self, grants), fields(count = grants.len()))]
    pub async fn bulk_grant(
        &self,
        actor: &str,
        grants: Vec<ResourcePermissionGrant>,
    ) -> AdminResult<Vec<ResourcePermission>> {
        require_actor(actor)?;
        if grants.is_empty() {
            return Err(AdminError::validation("bulk grant cannot be empty"));
        }
        if grants.len() > MAX_BULK_SIZE {
            return Err(AdminError::validation(format!(
                "bulk grant size {} exceeds maximum allowed {MAX_BULK_SIZE}",
                grants.len()
            )));
        }
        for (index, grant) in grants.iter().enumerate() {
            validate_resource_grant(grant).map_err(|e| match e {
                AdminError::Validation { message } => {
                    AdminError::validation(format!("grant at index {index}: {message}"))
                }
                other => other,
            })?;
        }

        let now = Utc::now();
        let records: Vec<_> = grants
            .into_iter()
            .map(|grant| new_resource_permission(grant, now))
            .collect();
        self.store
            .write_resource_permissions(records.clone(), vec![])
            .await?;

        let users = Invalidation::subjects(records.iter().map(|r| r.user_id.clone()));
        self.committed(actor, "bulk_grant", &format!("{} grants", records.len()), users)
            .await;
        Ok(records)
    }

    /// Moves resource permissions from one user to another in one atomic write.
    ///
    /// With `resource`, only the permissions on that resource move. Returns the
    /// number of permissions moved.
    #[instrument(skip(self, resource))]
    pub async fn transfer_resource_permissions(
        &self,
        actor: &str,
        from_user: &str,
        to_user: &str,
        resource: Option<&ResourceRef>,
    ) -> AdminResult<usize> {
        require_actor(actor)?;
        require("source user id", from_user)?;
        require("target user id", to_user)?;
        if from_user == to_user {
            return Err(AdminError::validation(
                "cannot transfer permissions to the same user",
            ));
        }

        let filter = ResourcePermissionFilter {
            user_id: Some(from_user.to_string()),
            permission_id: None,
            resource_type: resource.map(|r| r.resource_type.clone()),
            resource_id: resource.map(|r| r.resource_id.clone()),
        };
        let rows = self.store.read_resource_permissions(&filter).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let deletes: Vec<_> = rows.iter().map(|r| r.id.clone()).collect();
        let writes: Vec<_> = rows
            .into_iter()
            .map(|row| ResourcePermission {
                id: Uuid::new_v4().to_string(),
                user_id: to_user.to_string(),
                created_at: now,
                ..row
            })
            .collect();
        let moved = writes.len();
        self.store.write_resource_permissions(writes, deletes).await?;

        self.committed(
            actor,
            "transfer_resource_permissions",
            &format!("{from_user}->{to_user}"),
            Invalidation::subjects([from_user, to_user]),
        )
        .await;
        Ok(moved)
    }

    // ---------------------------------------------------------------------
    // Delegations
    // ---------------------------------------------------------------------

    /// Delegates permissions from one user to another.
    ///
    /// The delegator must currently hold every delegated permission.
    #[instrument(
        skip(self, request),
        fields(delegator = %request.delegator_id, delegate = %request.delegate_id)
    )]
    pub async fn create_delegation(
        &self,
        actor: &str,
        request: DelegationRequest,
    ) -> AdminResult<Delegation> {
        require_actor(actor)?;
        require("delegator id", &request.delegator_id)?;
        require("delegate id", &request.delegate_id)?;
        require_window(request.valid_from, request.valid_until)?;
        if request.delegator_id == request.delegate_id {
            return Err(AdminError::validation(
                "a user cannot delegate to themselves",
            ));
        }
        if request.permission_ids.is_empty() {
            return Err(AdminError::validation(
                "delegation must include at least one permission",
            ));
        }

        for permission_id in &request.permission_ids {
            let permission = self.store.get_permission(permission_id).await?;
            self.require_held(&request.delegator_id, &permission).await?;
        }

        let delegation = self
            .store
            .create_delegation(Delegation {
                id: Uuid::new_v4().to_string(),
                delegator_id: request.delegator_id,
                delegate_id: request.delegate_id,
                permission_ids: request.permission_ids,
                valid_from: request.valid_from,
                valid_until: request.valid_until,
                revoked_at: None,
                reason: request.reason,
                created_at: Utc::now(),
            })
            .await?;

        self.committed(
            actor,
            "create_delegation",
            &delegation.id,
            Invalidation::subject(&delegation.delegate_id),
        )
        .await;
        Ok(delegation)
    }

    /// Revokes a delegation.
    #[instrument(skip(self))]
    pub async fn revoke_delegation(&self, actor: &str, id: &str) -> AdminResult<Delegation> {
        require_actor(actor)?;
        require("delegation id", id)?;

        let delegation = self.store.revoke_delegation(id, Utc::now()).await?;
        self.committed(
            actor,
            "revoke_delegation",
            id,
            Invalidation::subject(&delegation.delegate_id),
        )
        .await;
        Ok(delegation)
    }

    // ---------------------------------------------------------------------
    // Permissions
    // ---------------------------------------------------------------------

    /// Deactivates a permission. Inactive permissions never grant.
    ///
    /// Clears the whole decision cache.
    #[instrument(skip(self))]
    pub async fn deactivate_permission(
        &self,
        actor: &str,
        permission_id: &str,
    ) -> AdminResult<Permission> {
        require_actor(actor)?;
        require("permission id", permission_id)?;

        let permission = self
            .store
            .set_permission_active(permission_id, false)
            .await?;
        self.committed(actor, "deactivate_permission", permission_id, Invalidation::All)
            .await;
        Ok(permission)
    }

    // ---------------------------------------------------------------------
    // Hooks
    // ---------------------------------------------------------------------

    /// Members of a role, read after the commit. Falls back to clearing the
    /// whole cache when the member list cannot be read.
    async fn role_members(&self, role_id: &str) -> Invalidation {
        match self.store.list_role_members(role_id).await {
            Ok(members) => Invalidation::subjects(members.into_iter().map(|m| m.user_id)),
            Err(e) => {
                warn!(role_id = %role_id, error = %e, "cannot list role members, invalidating all");
                Invalidation::All
            }
        }
    }

    async fn require_held(&self, subject_id: &str, permission: &Permission) -> AdminResult<()> {
        let request = CheckRequest::new(
            subject_id,
            PermissionRef::new(&permission.module, &permission.action),
        );
        let decision = self.engine.check_permission(&request).await?;
        if decision.allowed {
            Ok(())
        } else {
            Err(AdminError::Forbidden {
                message: format!(
                    "'{subject_id}' does not hold '{}:{}'",
                    permission.module, permission.action
                ),
            })
        }
    }

    /// Post-hook: audit, then invalidate.
    async fn committed(
        &self,
        actor: &str,
        action: &'static str,
        record: &str,
        scope: Invalidation,
    ) {
        match scope {
            Invalidation::Subjects(subjects) => {
                info!(
                    target: AUDIT_TARGET,
                    actor = %actor,
                    action = action,
                    record = %record,
                    invalidated = subjects.len(),
                    "grant mutation committed"
                );
                for subject in &subjects {
                    self.engine.invalidate(subject).await;
                }
            }
            Invalidation::All => {
                info!(
                    target: AUDIT_TARGET,
                    actor = %actor,
                    action = action,
                    record = %record,
                    invalidated = "all",
                    "grant mutation committed"
                );
                self.engine.invalidate_all().await;
            }
        }
    }
}

fn require_actor(actor: &str) -> AdminResult<()> {
    require("actor", actor)
}

fn require(field: &str, value: &str) -> AdminResult<()> {
    if value.trim().is_empty() {
        return Err(AdminError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_window(
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
) -> AdminResult<()> {
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if from > until {
            return Err(AdminError::validation(format!(
                "valid_from ({from}) is after valid_until ({until})"
            )));
        }
    }
    Ok(())
}

fn require_conditions(conditions: Option<&serde_json::Value>) -> AdminResult<()> {
    if let Some(raw) = conditions {
        Conditions::from_json(raw).map_err(|e| AdminError::InvalidConditions {
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn validate_resource_grant(grant: &ResourcePermissionGrant) -> AdminResult<()> {
    require("user id", &grant.user_id)?;
    require("permission id", &grant.permission_id)?;
    require("resource type", &grant.resource_type)?;
    require("resource id", &grant.resource_id)?;
    require_window(grant.valid_from, grant.valid_until)?;
    require_conditions(grant.conditions.as_ref())
}

fn new_resource_permission(
    grant: ResourcePermissionGrant,
    now: DateTime<Utc>,
) -> ResourcePermission {
    ResourcePermission {
        id: Uuid::new_v4().to_string(),
        user_id: grant.user_id,
        permission_id: grant.permission_id,
        resource_type: grant.resource_type,
        resource_id: grant.resource_id,
        effect: grant.effect,
        valid_from: grant.valid_from,
        valid_until: grant.valid_until,
        conditions: grant.conditions,
        priority: grant.priority,
        created_at: now,
    }
}
