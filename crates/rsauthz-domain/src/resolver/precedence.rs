//! Precedence resolution: turning candidate grants into one decision.
//!
//! The order is fixed:
//! 1. Skip grants that violate record invariants or do not target this check
//! 2. Drop grants outside their validity window at `now`
//! 3. Drop grants whose conditions do not hold for the request context
//! 4. Any remaining DENY wins; otherwise any remaining ALLOW; otherwise
//!    implicit deny
//!
//! Within a polarity, the reported grant is the most specific one according
//! to [`Grant::specificity_cmp`].

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{Decision, Grant};

use super::types::CheckRequest;

/// Returns the grants that structurally apply to the request, most
/// specific first.
///
/// Records violating invariants are skipped with a warning instead of
/// failing the whole decision.
fn applicable<'a>(request: &CheckRequest, grants: &'a [Grant]) -> Vec<&'a Grant> {
    let mut candidates: Vec<&Grant> = grants
        .iter()
        .filter(|grant| {
            if let Err(message) = grant.check_invariants() {
                warn!(grant_id = %grant.id, %message, "skipping grant that violates invariants");
                return false;
            }
            if grant.subject_id != request.subject_id || grant.permission != request.permission {
                warn!(
                    grant_id = %grant.id,
                    grant_subject = %grant.subject_id,
                    grant_permission = %grant.permission,
                    "skipping grant returned for a different subject or permission"
                );
                return false;
            }
            grant.scope.covers(request.resource.as_ref())
        })
        .collect();
    candidates.sort_by(|a, b| b.specificity_cmp(a));
    candidates
}

/// Resolves candidate grants into a decision at `now`.
///
/// # Errors
///
/// Returns `DomainError::EvaluationError` if a grant that could affect the
/// outcome has conditions comparing incomparable types.
pub fn resolve(
    request: &CheckRequest,
    grants: &[Grant],
    now: DateTime<Utc>,
) -> DomainResult<Decision> {
    let mut best_allow: Option<&Grant> = None;

    for grant in applicable(request, grants) {
        if !grant.is_valid_at(now) {
            continue;
        }

        let satisfied = grant
            .conditions
            .evaluate(&request.context)
            .map_err(|source| DomainError::EvaluationError {
                grant_id: grant.id.clone(),
                source,
            })?;
        if !satisfied {
            debug!(grant_id = %grant.id, "grant conditions not satisfied");
            continue;
        }

        // Candidates are ordered most specific first, so the first DENY
        // reached is the one to report.
        if grant.polarity.is_deny() {
            return Ok(Decision::matched(grant.clone(), now));
        }
        if best_allow.is_none() {
            best_allow = Some(grant);
        }
    }

    Ok(match best_allow {
        Some(grant) => Decision::matched(grant.clone(), now),
        None => Decision::implicit_deny(now),
    })
}

/// Earliest instant after `now` at which any applicable grant enters or
/// leaves its validity window.
///
/// A decision computed at `now` may change at that instant, so cached
/// decisions must not outlive it.
pub fn next_transition(
    request: &CheckRequest,
    grants: &[Grant],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    applicable(request, grants)
        .into_iter()
        .filter_map(|grant| grant.next_transition_after(now))
        .min()
}
