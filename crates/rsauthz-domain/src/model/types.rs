//! Core type definitions for grants and decisions.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::Conditions;

/// A capability identifier: the module (resource type) and the action
/// (e.g., `document:READ`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionRef {
    /// The module or resource type the permission belongs to (e.g., "document").
    pub module: String,
    /// The action (e.g., "READ").
    pub action: String,
}

impl PermissionRef {
    /// Creates a new PermissionRef.
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            action: action.into(),
        }
    }

    /// Parses a permission from "module:action" format.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let (module, action) = value
            .split_once(':')
            .ok_or("permission must be in 'module:action' format")?;
        if module.is_empty() || action.is_empty() {
            return Err("permission module and action cannot be empty");
        }
        Ok(Self::new(module, action))
    }
}

impl fmt::Display for PermissionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

/// A concrete resource instance (e.g., `document:doc_1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// The resource type (e.g., "document").
    pub resource_type: String,
    /// The resource identifier, matched literally.
    pub resource_id: String,
}

impl ResourceRef {
    /// Creates a new ResourceRef.
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}

/// Whether a grant allows or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Allow,
    Deny,
}

impl Polarity {
    /// Returns `true` if this polarity is `Deny`.
    pub fn is_deny(&self) -> bool {
        matches!(self, Polarity::Deny)
    }
}

/// Where a grant applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantScope {
    /// Applies to every resource (granted through a role or delegation).
    Global,
    /// Applies to exactly one resource instance.
    Resource(ResourceRef),
}

impl GrantScope {
    /// Specificity rank: resource-scoped grants beat global ones.
    pub fn specificity(&self) -> u8 {
        match self {
            GrantScope::Global => 0,
            GrantScope::Resource(_) => 1,
        }
    }

    /// Returns true if this scope covers the requested resource.
    ///
    /// Global grants cover everything; resource grants require an exact match.
    pub fn covers(&self, resource: Option<&ResourceRef>) -> bool {
        match self {
            GrantScope::Global => true,
            GrantScope::Resource(scoped) => resource == Some(scoped),
        }
    }
}

/// The grant source a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantSource {
    Role,
    DirectResource,
    Delegation,
}

impl GrantSource {
    /// Precedence among sources when scope specificity is equal.
    pub fn rank(&self) -> u8 {
        match self {
            GrantSource::Role => 0,
            GrantSource::Delegation => 1,
            GrantSource::DirectResource => 2,
        }
    }
}

impl fmt::Display for GrantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrantSource::Role => "role",
            GrantSource::DirectResource => "direct resource",
            GrantSource::Delegation => "delegation",
        };
        f.write_str(name)
    }
}

/// A single authorization record contributing evidence toward a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    /// Stable identifier of the underlying record.
    pub id: String,
    pub subject_id: String,
    pub permission: PermissionRef,
    pub scope: GrantScope,
    pub polarity: Polarity,
    /// Inclusive lower bound; `None` means unbounded.
    pub valid_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound; `None` means unbounded.
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Conditions,
    pub source: GrantSource,
    /// Only comparable between grants of the same source (e.g., role level).
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Creates an unbounded, unconditional grant.
    pub fn new(
        id: impl Into<String>,
        subject_id: impl Into<String>,
        permission: PermissionRef,
        scope: GrantScope,
        polarity: Polarity,
        source: GrantSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            permission,
            scope,
            polarity,
            valid_from: None,
            valid_until: None,
            conditions: Conditions::default(),
            source,
            priority: 0,
            created_at,
        }
    }

    /// Sets the validity window.
    pub fn with_window(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    /// Sets the conditions.
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns true if the grant is temporally valid at `at` (both bounds inclusive).
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= at)
            && self.valid_until.map_or(true, |until| until >= at)
    }

    /// Checks the record invariants, returning a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("grant id cannot be empty".to_string());
        }
        if self.subject_id.is_empty() {
            return Err("subject id cannot be empty".to_string());
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err(format!(
                    "valid_from ({from}) is after valid_until ({until})"
                ));
            }
        }
        if let GrantScope::Resource(resource) = &self.scope {
            if resource.resource_type.is_empty() || resource.resource_id.is_empty() {
                return Err("resource scope requires a type and an id".to_string());
            }
        }
        Ok(())
    }

    /// Returns the next instant after `at` at which this grant's validity changes.
    pub fn next_transition_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let starts = self.valid_from.filter(|from| *from > at);
        // valid_until is inclusive, so the grant stops applying just after it.
        let ends = self
            .valid_until
            .filter(|until| *until >= at)
            .map(|until| until + chrono::Duration::nanoseconds(1));
        match (starts, ends) {
            (Some(s), Some(e)) => Some(s.min(e)),
            (s, e) => s.or(e),
        }
    }

    /// Orders grants by specificity: the greatest grant is the one a decision reports.
    ///
    /// Resource scope beats global scope, then source rank, then higher priority,
    /// then the most recently created grant, then the smallest id.
    pub fn specificity_cmp(&self, other: &Grant) -> Ordering {
        self.scope
            .specificity()
            .cmp(&other.scope.specificity())
            .then_with(|| self.source.rank().cmp(&other.source.rank()))
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// The output of a permission check.
///
/// Decisions are derived data: they are cached and recomputed, never stored
/// as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// The grant that determined the outcome, if any.
    pub matched_grant: Option<Grant>,
    pub evaluated_at: DateTime<Utc>,
    pub reason: String,
}

/// Reason reported when no grant applies.
pub const NO_APPLICABLE_GRANT: &str = "no applicable grant";

impl Decision {
    /// An explicit decision backed by a grant.
    pub fn matched(grant: Grant, evaluated_at: DateTime<Utc>) -> Self {
        let allowed = !grant.polarity.is_deny();
        let verb = if allowed { "allowed" } else { "denied" };
        let reason = format!("{} by {} grant '{}'", verb, grant.source, grant.id);
        Self {
            allowed,
            matched_grant: Some(grant),
            evaluated_at,
            reason,
        }
    }

    /// The implicit deny returned when no grant applies.
    pub fn implicit_deny(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            matched_grant: None,
            evaluated_at,
            reason: NO_APPLICABLE_GRANT.to_string(),
        }
    }

    /// A fail-closed deny produced when the decision could not be computed.
    pub fn failed_closed(error: impl fmt::Display, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            matched_grant: None,
            evaluated_at,
            reason: format!("denied: {error}"),
        }
    }
}
