//! Engine test suite: request validation, store failures, fail-closed
//! authorization and decision caching.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::mocks::{
    base_time, create_engine, read_perm, resource_grant, role_grant, MockGrantStore,
};
use crate::cache::{DecisionCache, DecisionCacheConfig};
use crate::condition::ConditionContext;
use crate::error::DomainError;
use crate::model::{PermissionRef, Polarity};
use crate::resolver::{CheckRequest, PermissionEngine, ResolverConfig};

fn doc_request(subject: &str, doc: &str) -> CheckRequest {
    CheckRequest::new(subject, read_perm()).with_resource("document", doc)
}

fn cached_engine() -> (
    Arc<MockGrantStore>,
    Arc<DecisionCache>,
    PermissionEngine<MockGrantStore>,
) {
    let store = Arc::new(MockGrantStore::new());
    let cache = Arc::new(DecisionCache::new(
        DecisionCacheConfig::default().with_enabled(true),
    ));
    let config = ResolverConfig::default().with_cache(Arc::clone(&cache));
    let engine = PermissionEngine::with_config(Arc::clone(&store), config);
    (store, cache, engine)
}

// ========== Section 1: Request Validation ==========

#[tokio::test]
async fn test_rejects_malformed_requests() {
    let (_store, engine) = create_engine();

    let cases = vec![
        (CheckRequest::new("", read_perm()), "empty subject"),
        (CheckRequest::new("   ", read_perm()), "blank subject"),
        (
            CheckRequest::new("alice", PermissionRef::new("", "READ")),
            "empty module",
        ),
        (
            CheckRequest::new("alice", PermissionRef::new("document", "")),
            "empty action",
        ),
        (
            CheckRequest::new("alice", read_perm()).with_resource("", "doc_1"),
            "empty resource type",
        ),
        (
            CheckRequest::new("alice", read_perm()).with_resource("document", ""),
            "empty resource id",
        ),
    ];

    for (request, desc) in cases {
        let result = engine.check_permission(&request).await;
        assert!(
            matches!(
                result,
                Err(DomainError::InvalidSubject { .. })
                    | Err(DomainError::InvalidPermission { .. })
                    | Err(DomainError::InvalidResource { .. })
            ),
            "Should reject {desc}, got: {result:?}"
        );
    }
}

#[tokio::test]
async fn test_invalid_request_does_not_reach_store() {
    let (store, engine) = create_engine();

    let _ = engine
        .check_permission(&CheckRequest::new("", read_perm()))
        .await;

    assert_eq!(store.fetch_count(), 0);
}

// ========== Section 2: Store Failures and Fail-Closed ==========

#[tokio::test]
async fn test_store_unavailable_is_propagated() {
    let (store, engine) = create_engine();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;
    store.set_unavailable(true);

    let err = engine
        .check_permission(&doc_request("alice", "doc_1"))
        .await
        .unwrap_err();

    assert!(err.is_store_unavailable(), "got: {err:?}");
}

#[tokio::test]
async fn test_store_timeout_surfaces_as_unavailable() {
    let store = Arc::new(MockGrantStore::new());
    store.set_delay(Duration::from_secs(10)).await;
    let config = ResolverConfig::default().with_store_timeout(Duration::from_millis(50));
    let engine = PermissionEngine::with_config(Arc::clone(&store), config);

    let start = std::time::Instant::now();
    let result = engine.check_permission(&doc_request("alice", "doc_1")).await;

    assert!(
        start.elapsed() < Duration::from_secs(1),
        "Store timeout should bound the check"
    );
    match result {
        Err(DomainError::StoreUnavailable { message }) => {
            assert!(message.contains("50ms"), "message: {message}");
        }
        other => panic!("Expected StoreUnavailable, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_authorize_fails_closed_on_store_error() {
    let (store, engine) = create_engine();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;
    store.set_unavailable(true);

    let decision = engine.authorize(&doc_request("alice", "doc_1")).await;

    assert!(!decision.allowed);
    assert!(decision.matched_grant.is_none());
    assert!(
        decision.reason.contains("grant store unavailable"),
        "reason: {}",
        decision.reason
    );
}

#[tokio::test]
async fn test_authorize_fails_closed_on_evaluation_error() {
    let (store, engine) = create_engine();
    let conditions =
        crate::condition::Conditions::from_json(&serde_json::json!({"amount": {"$gt": 5}}))
            .unwrap();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow).with_conditions(conditions))
        .await;

    let request = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("amount", "five"));
    let decision = engine.authorize(&request).await;

    assert!(!decision.allowed);
    assert!(decision.reason.contains("g1"), "reason: {}", decision.reason);
}

#[tokio::test]
async fn test_authorize_passes_through_successful_decision() {
    let (store, engine) = create_engine();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;

    let decision = engine.authorize(&doc_request("alice", "doc_1")).await;
    assert!(decision.allowed);
}

// ========== Section 3: Idempotence ==========

#[tokio::test]
async fn test_repeated_checks_are_idempotent() {
    let (store, engine) = create_engine();
    store
        .add_grant(role_grant("editor-read", "alice", Polarity::Allow))
        .await;
    store
        .add_grant(resource_grant("doc1-deny", "alice", "doc_1", Polarity::Deny))
        .await;

    let request = doc_request("alice", "doc_1").at(base_time());
    let first = engine.check_permission(&request).await.unwrap();
    for _ in 0..5 {
        let again = engine.check_permission(&request).await.unwrap();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn test_cached_and_uncached_decisions_agree() {
    let (store, _cache, engine) = cached_engine();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;

    let request = doc_request("alice", "doc_1");
    let fresh = engine.check_permission(&request).await.unwrap();
    let cached = engine.check_permission(&request).await.unwrap();

    assert_eq!(fresh, cached);
    assert_eq!(store.fetch_count(), 1);
}

// ========== Section 4: Caching ==========

#[tokio::test]
async fn test_no_cache_queries_store_every_time() {
    let (store, engine) = create_engine();

    for _ in 0..3 {
        engine
            .check_permission(&doc_request("alice", "doc_1"))
            .await
            .unwrap();
    }

    assert_eq!(store.fetch_count(), 3);
    assert_eq!(engine.cache_metrics().snapshot().hits, 0);
}

#[tokio::test]
async fn test_disabled_cache_is_not_used() {
    let store = Arc::new(MockGrantStore::new());
    let cache = Arc::new(DecisionCache::new(DecisionCacheConfig::default()));
    let engine = PermissionEngine::with_config(
        Arc::clone(&store),
        ResolverConfig::default().with_cache(cache),
    );

    for _ in 0..2 {
        engine
            .check_permission(&doc_request("alice", "doc_1"))
            .await
            .unwrap();
    }

    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_cache_hit_skips_store() {
    let (store, _cache, engine) = cached_engine();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;

    let request = doc_request("alice", "doc_1");
    engine.check_permission(&request).await.unwrap();
    engine.check_permission(&request).await.unwrap();

    assert_eq!(store.fetch_count(), 1);
    let metrics = engine.cache_metrics().snapshot();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert!((engine.cache_metrics().hit_ratio() - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_invalidate_forces_store_read() {
    let (store, _cache, engine) = cached_engine();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;
    let request = doc_request("alice", "doc_1");

    assert!(engine.check_permission(&request).await.unwrap().allowed);

    // Mutation committed, then invalidation.
    store
        .add_grant(resource_grant("deny", "alice", "doc_1", Polarity::Deny))
        .await;
    engine.invalidate("alice").await;

    let decision = engine.check_permission(&request).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_invalidate_only_affects_subject() {
    let (store, _cache, engine) = cached_engine();
    let alice = doc_request("alice", "doc_1");
    let bob = doc_request("bob", "doc_1");

    engine.check_permission(&alice).await.unwrap();
    engine.check_permission(&bob).await.unwrap();
    engine.invalidate("alice").await;
    engine.check_permission(&alice).await.unwrap();
    engine.check_permission(&bob).await.unwrap();

    // Initial two reads plus alice's re-read.
    assert_eq!(store.fetch_count(), 3);
}

#[tokio::test]
async fn test_invalidate_all_clears_every_subject() {
    let (store, _cache, engine) = cached_engine();
    let alice = doc_request("alice", "doc_1");
    let bob = doc_request("bob", "doc_1");

    engine.check_permission(&alice).await.unwrap();
    engine.check_permission(&bob).await.unwrap();
    engine.invalidate_all().await;
    engine.check_permission(&alice).await.unwrap();
    engine.check_permission(&bob).await.unwrap();

    assert_eq!(store.fetch_count(), 4);
}

#[tokio::test]
async fn test_different_contexts_do_not_share_entries() {
    let (store, _cache, engine) = cached_engine();
    let conditions = crate::condition::Conditions::from_json(
        &serde_json::json!({"department": "finance"}),
    )
    .unwrap();
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow).with_conditions(conditions))
        .await;

    let finance = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("department", "finance"));
    let sales = doc_request("alice", "doc_1")
        .with_context(ConditionContext::new().with("department", "sales"));

    assert!(engine.check_permission(&finance).await.unwrap().allowed);
    assert!(!engine.check_permission(&sales).await.unwrap().allowed);
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_point_in_time_checks_bypass_cache() {
    let (store, cache, engine) = cached_engine();
    let request = doc_request("alice", "doc_1").at(base_time());

    engine.check_permission(&request).await.unwrap();
    engine.check_permission(&request).await.unwrap();

    assert_eq!(store.fetch_count(), 2);
    assert_eq!(engine.cache_metrics().snapshot().skips, 2);
    cache.run_pending_tasks().await;
    assert_eq!(cache.entry_count(), 0);
}

#[tokio::test]
async fn test_store_errors_are_not_cached() {
    let (store, _cache, engine) = cached_engine();
    store.set_unavailable(true);
    let request = doc_request("alice", "doc_1");

    assert!(engine.check_permission(&request).await.is_err());

    store.set_unavailable(false);
    assert!(engine.check_permission(&request).await.is_ok());
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_cache_entry_does_not_outlive_grant_expiry() {
    let (store, cache, engine) = cached_engine();
    let expires = Utc::now() + chrono::Duration::milliseconds(200);
    store
        .add_grant(role_grant("short", "alice", Polarity::Allow).with_window(None, Some(expires)))
        .await;
    let request = doc_request("alice", "doc_1");

    assert!(engine.check_permission(&request).await.unwrap().allowed);

    tokio::time::sleep(Duration::from_millis(400)).await;
    cache.run_pending_tasks().await;

    // Default TTL is 30s, but the entry was capped at the grant's expiry.
    assert!(!engine.check_permission(&request).await.unwrap().allowed);
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_check_racing_invalidation_does_not_cache_stale_decision() {
    let (store, _cache, engine) = cached_engine();
    let engine = Arc::new(engine);
    store
        .add_grant(role_grant("g1", "alice", Polarity::Allow))
        .await;
    store.set_delay(Duration::from_millis(100)).await;

    let request = doc_request("alice", "doc_1");
    let racing = {
        let engine = Arc::clone(&engine);
        let request = request.clone();
        tokio::spawn(async move { engine.check_permission(&request).await })
    };

    // The check is now inside the slow store read. Revoke and invalidate.
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.remove_grant("g1").await;
    engine.invalidate("alice").await;

    let stale = racing.await.unwrap().unwrap();
    assert!(stale.allowed, "racing check read pre-mutation grants");

    let decision = engine.check_permission(&request).await.unwrap();
    assert!(!decision.allowed, "stale ALLOW must not be served from cache");
}
