//! Permission engine: the single entry point for permission checks.
//!
//! # Architecture Decisions
//!
//! - **Precedence**: Resolution is a pure function over the candidate grants
//!   (see `precedence`). The engine only orchestrates validation, the store
//!   read, caching and metrics around it.
//!
//! - **Cache Consistency**: The subject's cache generation is captured before
//!   the store is read. A decision is cached only if no invalidation for the
//!   subject happened in between, and never beyond the next validity
//!   transition among the candidate grants.
//!
//! - **Timeout Handling**: The store query is bounded by
//!   `ResolverConfig::store_timeout`. A timeout is reported as
//!   `StoreUnavailable`, never as "no grants".
//!
//! - **Fail Closed**: `authorize` maps every error to a denying decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Timeout for cache operations (get/insert).
/// Cache should never block authorization checks; treat timeout as "cache unavailable".
const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(10);

use crate::cache::{CacheKey, DecisionCache};
use crate::error::{DomainError, DomainResult};
use crate::model::{Decision, Grant};

use super::config::ResolverConfig;
use super::precedence;
use super::traits::GrantStore;
use super::types::CheckRequest;

/// Metrics for cache performance monitoring.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Number of cache hits (decision served from cache).
    pub hits: AtomicU64,
    /// Number of cache misses (decision resolved from the store).
    pub misses: AtomicU64,
    /// Number of cache skips (point-in-time checks, cache timeouts).
    pub skips: AtomicU64,
}

impl CacheMetrics {
    /// Returns a snapshot of the current metrics.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
        }
    }

    /// Returns the cache hit ratio (hits / (hits + misses)).
    /// Returns 0.0 if no hits or misses have occurred.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub skips: u64,
}

/// Permission engine.
///
/// Answers "may subject S exercise permission P, optionally on resource R,
/// under context C?" from the grants supplied by a [`GrantStore`].
///
/// # Caching
///
/// When an enabled cache is configured, the engine will:
/// 1. Check the cache before querying the store
/// 2. Store fresh decisions, unless the subject was invalidated meanwhile
/// 3. Skip the cache for point-in-time checks
///
/// Cache metrics are available via `cache_metrics()` for monitoring.
pub struct PermissionEngine<S> {
    store: Arc<S>,
    config: ResolverConfig,
    /// Metrics for cache performance monitoring.
    cache_metrics: CacheMetrics,
}

impl<S> PermissionEngine<S>
where
    S: GrantStore + 'static,
{
    /// Creates a new engine without a cache.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    /// Creates a new engine with custom configuration.
    pub fn with_config(store: Arc<S>, config: ResolverConfig) -> Self {
        Self {
            store,
            config,
            cache_metrics: CacheMetrics::default(),
        }
    }

    /// Returns the cache metrics for monitoring.
    pub fn cache_metrics(&self) -> &CacheMetrics {
        &self.cache_metrics
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Performs a permission check.
    ///
    /// # Errors
    ///
    /// - `InvalidSubject` / `InvalidPermission` / `InvalidResource` for
    ///   malformed requests
    /// - `StoreUnavailable` if the grant store failed or timed out
    /// - `EvaluationError` if an applicable grant's conditions compare
    ///   incomparable types
    #[instrument(
        skip(self, request),
        fields(
            subject = %request.subject_id,
            permission = %request.permission,
            resource = request.resource.as_ref().map(tracing::field::display),
        )
    )]
    pub async fn check_permission(&self, request: &CheckRequest) -> DomainResult<Decision> {
        validate_request(request)?;

        let result = self.resolve_check(request).await;
        let outcome = match &result {
            Ok(decision) if decision.allowed => "allow",
            Ok(_) => "deny",
            Err(_) => "error",
        };
        metrics::counter!("rsauthz_decisions_total", "outcome" => outcome).increment(1);
        result
    }

    /// Performs a permission check, failing closed.
    ///
    /// Any error is turned into a denying decision whose `reason` carries the
    /// error. Use this at enforcement points that cannot handle errors.
    pub async fn authorize(&self, request: &CheckRequest) -> Decision {
        match self.check_permission(request).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    subject = %request.subject_id,
                    permission = %request.permission,
                    error = %err,
                    "permission check failed, denying"
                );
                Decision::failed_closed(&err, Utc::now())
            }
        }
    }

    /// Drops every cached decision for a subject.
    ///
    /// Call after committing any grant mutation affecting the subject.
    pub async fn invalidate(&self, subject_id: &str) {
        if let Some(cache) = &self.config.cache {
            cache.invalidate_subject(subject_id).await;
        }
    }

    /// Drops every cached decision.
    pub async fn invalidate_all(&self) {
        if let Some(cache) = &self.config.cache {
            cache.invalidate_all().await;
        }
    }

    /// Returns the cache to use for this request, if any.
    fn cache_for(&self, request: &CheckRequest) -> Option<&Arc<DecisionCache>> {
        let cache = self.config.cache.as_ref().filter(|c| c.is_enabled())?;
        if request.at.is_some() {
            // Cached decisions are computed at wall-clock time.
            self.cache_metrics.skips.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(cache)
    }

    async fn resolve_check(&self, request: &CheckRequest) -> DomainResult<Decision> {
        let cache_and_key = self.cache_for(request).map(|cache| {
            let key = CacheKey::new(
                &request.subject_id,
                request.permission.clone(),
                request.resource.clone(),
                request.context.fingerprint(),
            );
            (cache, key)
        });

        // Cache operations are bounded by CACHE_OP_TIMEOUT to prevent blocking auth checks.
        if let Some((cache, key)) = &cache_and_key {
            match timeout(CACHE_OP_TIMEOUT, cache.get(key)).await {
                Ok(Some(decision)) => {
                    self.cache_metrics.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(allowed = decision.allowed, "decision served from cache");
                    return Ok(decision);
                }
                Ok(None) => {
                    self.cache_metrics.misses.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.cache_metrics.skips.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // Captured before the read so an invalidation racing this check
        // prevents the insert below.
        let generation = cache_and_key
            .as_ref()
            .map(|(cache, _)| cache.generation(&request.subject_id));

        let grants = self.fetch_grants(request).await?;
        let now = request.at.unwrap_or_else(Utc::now);
        let decision = precedence::resolve(request, &grants, now)?;
        debug!(
            allowed = decision.allowed,
            candidates = grants.len(),
            reason = %decision.reason,
            "decision resolved"
        );

        if let (Some((cache, key)), Some(generation)) = (cache_and_key, generation) {
            let mut ttl = cache.config().default_ttl;
            if let Some(transition) = precedence::next_transition(request, &grants, now) {
                let until = (transition - now).to_std().unwrap_or(Duration::ZERO);
                ttl = ttl.min(until);
            }
            // Best-effort: a slow insert must not delay the response.
            let _ = timeout(
                CACHE_OP_TIMEOUT,
                cache.insert_if_current(key, decision.clone(), ttl, generation),
            )
            .await;
        }

        Ok(decision)
    }

    async fn fetch_grants(&self, request: &CheckRequest) -> DomainResult<Vec<Grant>> {
        let fetch = self.store.fetch_candidate_grants(
            &request.subject_id,
            &request.permission,
            request.resource.as_ref(),
        );
        match timeout(self.config.store_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::StoreUnavailable {
                message: format!(
                    "grant store did not answer within {}ms",
                    self.config.store_timeout.as_millis()
                ),
            }),
        }
    }
}

/// Rejects requests the store could never answer meaningfully.
fn validate_request(request: &CheckRequest) -> DomainResult<()> {
    if request.subject_id.trim().is_empty() {
        return Err(DomainError::InvalidSubject {
            value: request.subject_id.clone(),
        });
    }

    let permission = &request.permission;
    if permission.module.is_empty()
        || permission.action.is_empty()
        || permission.module.contains(':')
        || permission.action.contains(':')
    {
        return Err(DomainError::InvalidPermission {
            value: permission.to_string(),
        });
    }

    if let Some(resource) = &request.resource {
        if resource.resource_type.is_empty() {
            return Err(DomainError::InvalidResource {
                message: "resource type cannot be empty".to_string(),
            });
        }
        if resource.resource_id.is_empty() {
            return Err(DomainError::InvalidResource {
                message: format!(
                    "resource id cannot be empty for type '{}'",
                    resource.resource_type
                ),
            });
        }
    }

    Ok(())
}
