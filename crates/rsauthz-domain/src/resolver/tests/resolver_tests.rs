//! Precedence resolver test suite.
//!
//! Covers the resolution rules in isolation (`resolve` over a grant slice)
//! and end to end through the engine with a mock store:
//! - Deny wins, implicit deny
//! - Specificity tie-breaking
//! - Temporal validity windows
//! - Conditions and evaluation errors
//! - Skipping of invalid grant data

use chrono::Duration;
use serde_json::json;

use super::mocks::{
    base_time, create_engine, delegation_grant, read_perm, resource_grant, role_grant,
};
use crate::condition::{ConditionContext, Conditions};
use crate::error::DomainError;
use crate::model::{GrantSource, Polarity, NO_APPLICABLE_GRANT};
use crate::resolver::{next_transition, resolve, CheckRequest};

fn doc_request(subject: &str, doc: &str) -> CheckRequest {
    CheckRequest::new(subject, read_perm()).with_resource("document", doc)
}

fn conditions(value: serde_json::Value) -> Conditions {
    Conditions::from_json(&value).unwrap()
}

// ========== Section 1: Deny Wins and Implicit Deny ==========

#[test]
fn test_no_grants_is_implicit_deny() {
    let decision = resolve(&doc_request("alice", "doc_1"), &[], base_time()).unwrap();

    assert!(!decision.allowed);
    assert!(decision.matched_grant.is_none());
    assert_eq!(decision.reason, NO_APPLICABLE_GRANT);
}

#[test]
fn test_single_allow_grants_access() {
    let grants = vec![role_grant("g1", "alice", Polarity::Allow)];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.matched_grant.unwrap().id, "g1");
}

#[test]
fn test_global_deny_beats_resource_allow() {
    // Deny wins regardless of specificity.
    let grants = vec![
        resource_grant("allow-doc", "alice", "doc_1", Polarity::Allow),
        role_grant("deny-role", "alice", Polarity::Deny),
    ];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();

    assert!(!decision.allowed);
    assert_eq!(decision.matched_grant.unwrap().id, "deny-role");
}

#[test]
fn test_role_allow_with_resource_deny_scenario() {
    // Role ALLOW on document:READ, direct DENY on doc_1 only.
    let grants = vec![
        role_grant("editor-read", "alice", Polarity::Allow),
        resource_grant("doc1-deny", "alice", "doc_1", Polarity::Deny),
    ];

    let doc_1 = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();
    assert!(!doc_1.allowed);
    assert_eq!(doc_1.matched_grant.unwrap().id, "doc1-deny");

    let doc_2 = resolve(&doc_request("alice", "doc_2"), &grants, base_time()).unwrap();
    assert!(doc_2.allowed);
    assert_eq!(doc_2.matched_grant.unwrap().id, "editor-read");
}

#[test]
fn test_reason_names_source_and_grant() {
    let grants = vec![resource_grant("g-7", "alice", "doc_1", Polarity::Deny)];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();

    assert_eq!(decision.reason, "denied by direct resource grant 'g-7'");
}

#[test]
fn test_resource_grant_does_not_apply_to_global_check() {
    let grants = vec![resource_grant("g1", "alice", "doc_1", Polarity::Allow)];
    let request = CheckRequest::new("alice", read_perm());

    let decision = resolve(&request, &grants, base_time()).unwrap();
    assert!(!decision.allowed);
}

// ========== Section 2: Specificity ==========

#[test]
fn test_resource_allow_reported_over_role_allow() {
    let grants = vec![
        role_grant("role", "alice", Polarity::Allow),
        resource_grant("direct", "alice", "doc_1", Polarity::Allow),
    ];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();

    assert_eq!(decision.matched_grant.unwrap().id, "direct");
}

#[test]
fn test_delegation_ranks_above_role_at_global_scope() {
    let grants = vec![
        role_grant("role", "alice", Polarity::Allow).with_priority(100),
        delegation_grant("delegated", "alice"),
    ];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();

    let matched = decision.matched_grant.unwrap();
    assert_eq!(matched.id, "delegated");
    assert_eq!(matched.source, GrantSource::Delegation);
}

#[test]
fn test_higher_priority_wins_within_source() {
    let grants = vec![
        role_grant("viewer", "alice", Polarity::Allow).with_priority(1),
        role_grant("admin", "alice", Polarity::Allow).with_priority(10),
    ];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();

    assert_eq!(decision.matched_grant.unwrap().id, "admin");
}

#[test]
fn test_newer_then_smallest_id_breaks_ties() {
    let mut older = role_grant("a-old", "alice", Polarity::Deny);
    older.created_at = base_time() - Duration::days(1);
    let newer = role_grant("z-new", "alice", Polarity::Deny);

    let decision = resolve(
        &doc_request("alice", "doc_1"),
        &[older, newer],
        base_time(),
    )
    .unwrap();
    assert_eq!(decision.matched_grant.unwrap().id, "z-new");

    let grants = vec![
        role_grant("b", "alice", Polarity::Deny),
        role_grant("a", "alice", Polarity::Deny),
    ];
    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();
    assert_eq!(decision.matched_grant.unwrap().id, "a");
}

#[test]
fn test_resolution_is_independent_of_input_order() {
    let mut grants = vec![
        role_grant("r1", "alice", Polarity::Allow).with_priority(3),
        role_grant("r2", "alice", Polarity::Allow).with_priority(7),
        delegation_grant("d1", "alice"),
        resource_grant("x1", "alice", "doc_1", Polarity::Allow),
    ];
    let request = doc_request("alice", "doc_1");
    let forward = resolve(&request, &grants, base_time()).unwrap();
    grants.reverse();
    let backward = resolve(&request, &grants, base_time()).unwrap();

    assert_eq!(forward, backward);
}

// ========== Section 3: Temporal Validity ==========

#[test]
fn test_validity_window_boundaries() {
    let t = base_time();
    let grants = vec![role_grant("g1", "alice", Polarity::Allow)
        .with_window(Some(t), Some(t + Duration::hours(1)))];
    let request = doc_request("alice", "doc_1");

    let cases = vec![
        (t - Duration::seconds(1), false, "one second before valid_from"),
        (t, true, "at valid_from (inclusive)"),
        (t + Duration::hours(1), true, "at valid_until (inclusive)"),
        (t + Duration::hours(1) + Duration::seconds(1), false, "one second after valid_until"),
    ];

    for (now, expected, desc) in cases {
        let decision = resolve(&request, &grants, now).unwrap();
        assert_eq!(decision.allowed, expected, "{desc}");
    }
}

#[test]
fn test_expired_deny_no_longer_overrides_allow() {
    let t = base_time();
    let grants = vec![
        role_grant("allow", "alice", Polarity::Allow),
        resource_grant("deny", "alice", "doc_1", Polarity::Deny)
            .with_window(None, Some(t - Duration::seconds(1))),
    ];

    let decision = resolve(&doc_request("alice", "doc_1"), &grants, t).unwrap();
    assert!(decision.allowed);
}

#[test]
fn test_next_transition_is_earliest_boundary() {
    let t = base_time();
    let grants = vec![
        role_grant("starts", "alice", Polarity::Allow).with_window(Some(t + Duration::hours(2)), None),
        role_grant("ends", "alice", Polarity::Deny).with_window(None, Some(t + Duration::hours(1))),
        role_grant("forever", "alice", Polarity::Allow),
    ];

    let next = next_transition(&doc_request("alice", "doc_1"), &grants, t).unwrap();
    assert!(next > t + Duration::hours(1));
    assert!(next < t + Duration::hours(1) + Duration::seconds(1));
}

#[test]
fn test_next_transition_none_for_unbounded_grants() {
    let grants = vec![role_grant("forever", "alice", Polarity::Allow)];
    assert!(next_transition(&doc_request("alice", "doc_1"), &grants, base_time()).is_none());
}

// ========== Section 4: Conditions ==========

#[test]
fn test_conditions_gate_allow() {
    let grants = vec![role_grant("g1", "alice", Polarity::Allow)
        .with_conditions(conditions(json!({"department": "finance"})))];

    let finance = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("department", "finance"));
    let sales = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("department", "sales"));

    assert!(resolve(&finance, &grants, base_time()).unwrap().allowed);
    assert!(!resolve(&sales, &grants, base_time()).unwrap().allowed);
}

#[test]
fn test_missing_context_key_never_matches_and_never_errors() {
    // Both grants reference a key the context lacks; neither applies.
    let grants = vec![
        role_grant("allow", "alice", Polarity::Allow)
            .with_conditions(conditions(json!({"amount": {"$lte": 1000}}))),
        resource_grant("deny", "alice", "doc_1", Polarity::Deny)
            .with_conditions(conditions(json!({"ip_range": "external"}))),
    ];

    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, NO_APPLICABLE_GRANT);
}

#[test]
fn test_conditional_deny_applies_only_when_satisfied() {
    let grants = vec![
        role_grant("allow", "alice", Polarity::Allow),
        resource_grant("deny-large", "alice", "doc_1", Polarity::Deny)
            .with_conditions(conditions(json!({"amount": {"$gt": 1000}}))),
    ];

    let small = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("amount", 10_i64));
    let large = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("amount", 5000_i64));

    assert!(resolve(&small, &grants, base_time()).unwrap().allowed);
    assert!(!resolve(&large, &grants, base_time()).unwrap().allowed);
}

#[test]
fn test_evaluation_error_carries_grant_id() {
    let grants = vec![role_grant("bad-cond", "alice", Polarity::Allow)
        .with_conditions(conditions(json!({"amount": {"$gt": 5}})))];
    let request = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("amount", "lots"));

    let err = resolve(&request, &grants, base_time()).unwrap_err();
    match err {
        DomainError::EvaluationError { grant_id, .. } => assert_eq!(grant_id, "bad-cond"),
        other => panic!("Expected EvaluationError, got: {other:?}"),
    }
}

#[test]
fn test_expired_grant_conditions_are_not_evaluated() {
    // The incomparable comparison would error, but the grant is out of window.
    let t = base_time();
    let grants = vec![role_grant("old", "alice", Polarity::Allow)
        .with_window(None, Some(t - Duration::days(1)))
        .with_conditions(conditions(json!({"amount": {"$gt": 5}})))];
    let request = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("amount", "lots"));

    let decision = resolve(&request, &grants, t).unwrap();
    assert!(!decision.allowed);
}

// ========== Section 5: Invalid Grant Data ==========

#[test]
fn test_inverted_window_is_skipped() {
    let t = base_time();
    let grants = vec![
        role_grant("inverted", "alice", Polarity::Deny)
            .with_window(Some(t + Duration::days(1)), Some(t - Duration::days(1))),
        role_grant("ok", "alice", Polarity::Allow),
    ];

    let decision = resolve(&doc_request("alice", "doc_1"), &grants, t).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.matched_grant.unwrap().id, "ok");
}

#[test]
fn test_grant_for_other_subject_or_permission_is_skipped() {
    let mut wrong_perm = role_grant("wrong-perm", "alice", Polarity::Allow);
    wrong_perm.permission = crate::model::PermissionRef::new("document", "WRITE");
    let grants = vec![role_grant("bob-allow", "bob", Polarity::Allow), wrong_perm];

    let decision = resolve(&doc_request("alice", "doc_1"), &grants, base_time()).unwrap();
    assert!(!decision.allowed);
}

// ========== Section 6: End to End Through the Engine ==========

#[tokio::test]
async fn test_engine_resolves_example_scenario() {
    let (store, engine) = create_engine();
    store
        .add_grant(role_grant("editor-read", "alice", Polarity::Allow))
        .await;
    store
        .add_grant(resource_grant("doc1-deny", "alice", "doc_1", Polarity::Deny))
        .await;

    let doc_1 = engine
        .check_permission(&doc_request("alice", "doc_1"))
        .await
        .unwrap();
    let doc_2 = engine
        .check_permission(&doc_request("alice", "doc_2"))
        .await
        .unwrap();

    assert!(!doc_1.allowed);
    assert!(doc_2.allowed);
}

#[tokio::test]
async fn test_engine_point_in_time_check() {
    let (store, engine) = create_engine();
    let t = base_time();
    store
        .add_grant(
            role_grant("window", "alice", Polarity::Allow)
                .with_window(Some(t), Some(t + Duration::hours(1))),
        )
        .await;

    let inside = doc_request("alice", "doc_1").at(t + Duration::minutes(30));
    let after = doc_request("alice", "doc_1").at(t + Duration::hours(1) + Duration::seconds(1));

    let decision = engine.check_permission(&inside).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.evaluated_at, t + Duration::minutes(30));
    assert!(!engine.check_permission(&after).await.unwrap().allowed);
}

// ========== Section 7: Property-Based Tests ==========

use proptest::prelude::*;

use crate::model::Grant;

/// Strategy for an alice grant of any source, scope, polarity, window and
/// condition. Many of them do not apply to alice reading doc_1 at
/// `base_time()` in region "eu".
fn grant_strategy() -> impl Strategy<Value = Grant> {
    (
        "[a-z0-9]{1,8}",
        prop::bool::ANY,
        0u8..3,
        0u8..3,
        -5i32..5,
        0u8..4,
        prop::option::of(prop::bool::ANY),
    )
        .prop_map(|(id, deny, scope, source, priority, window, region_matches)| {
            let polarity = if deny { Polarity::Deny } else { Polarity::Allow };
            let mut grant = match scope {
                0 => role_grant(&id, "alice", polarity),
                1 => resource_grant(&id, "alice", "doc_1", polarity),
                _ => resource_grant(&id, "alice", "doc_2", polarity),
            };
            grant.source = match source {
                0 => GrantSource::Role,
                1 => GrantSource::Delegation,
                _ => GrantSource::DirectResource,
            };
            let t = base_time();
            grant = match window {
                0 => grant,
                1 => grant.with_window(Some(t - Duration::hours(1)), Some(t + Duration::hours(1))),
                2 => grant.with_window(Some(t - Duration::hours(2)), Some(t - Duration::hours(1))),
                _ => grant.with_window(Some(t + Duration::hours(1)), None),
            };
            if let Some(matches) = region_matches {
                let region = if matches { "eu" } else { "us" };
                grant = grant.with_conditions(Conditions::default().with_equals("region", region));
            }
            grant.with_priority(priority)
        })
}

fn alice_reads_doc_1() -> CheckRequest {
    doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("region", "eu"))
}

/// The grants `resolve` must consider for `request` at `base_time()`.
fn applying<'a>(request: &CheckRequest, grants: &'a [Grant]) -> Vec<&'a Grant> {
    grants
        .iter()
        .filter(|g| g.subject_id == request.subject_id)
        .filter(|g| g.scope.covers(request.resource.as_ref()))
        .filter(|g| g.is_valid_at(base_time()))
        .filter(|g| g.conditions.evaluate(&request.context).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: any applicable DENY makes the decision a deny.
    #[test]
    fn test_property_deny_wins(grants in prop::collection::vec(grant_strategy(), 0..12)) {
        let request = alice_reads_doc_1();
        let decision = resolve(&request, &grants, base_time()).unwrap();
        let applying = applying(&request, &grants);

        let any_deny = applying.iter().any(|g| g.polarity.is_deny());
        let any_allow = applying.iter().any(|g| !g.polarity.is_deny());

        if any_deny {
            prop_assert!(!decision.allowed);
            prop_assert!(decision.matched_grant.as_ref().unwrap().polarity.is_deny());
        } else if any_allow {
            prop_assert!(decision.allowed);
        } else {
            prop_assert!(!decision.allowed);
            prop_assert!(decision.matched_grant.is_none());
            prop_assert_eq!(decision.reason.as_str(), NO_APPLICABLE_GRANT);
        }
    }

    /// Property: with no applicable grant the decision is an implicit deny.
    #[test]
    fn test_property_implicit_deny(grants in prop::collection::vec(grant_strategy(), 0..12)) {
        // Alice's grants never apply to bob.
        let request = doc_request("bob", "doc_1")
            .with_context(ConditionContext::new().with("region", "eu"));
        let decision = resolve(&request, &grants, base_time()).unwrap();

        prop_assert!(!decision.allowed);
        prop_assert!(decision.matched_grant.is_none());
        prop_assert_eq!(decision.reason.as_str(), NO_APPLICABLE_GRANT);
    }

    /// Property: the matched grant applies and is the most specific applying
    /// grant of its polarity.
    #[test]
    fn test_property_matched_grant_is_most_specific(
        grants in prop::collection::vec(grant_strategy(), 1..12),
    ) {
        let request = alice_reads_doc_1();
        let decision = resolve(&request, &grants, base_time()).unwrap();
        let applying = applying(&request, &grants);

        let Some(matched) = decision.matched_grant else {
            prop_assert!(applying.is_empty());
            return Ok(());
        };
        prop_assert!(
            applying.iter().any(|g| **g == matched),
            "matched {} does not apply",
            matched.id
        );

        for grant in applying.iter().filter(|g| g.polarity == matched.polarity) {
            prop_assert_ne!(
                grant.specificity_cmp(&matched),
                std::cmp::Ordering::Greater,
                "{} is more specific than matched {}",
                grant.id,
                matched.id
            );
        }
    }
}
