//! Decision caching with TTL, LRU bounds and subject-wide invalidation.
//!
//! This module provides a concurrent decision cache using Moka for
//! storage with per-entry expiry and LRU capacity eviction.
//!
//! # Architecture
//!
//! The cache uses Moka's async Cache which provides:
//! - Lock-free concurrent reads
//! - Per-entry TTL via an `Expiry` policy
//! - LRU eviction once `max_capacity` is reached
//!
//! A `DashMap` secondary index maps each subject to its cached keys so that
//! `invalidate_subject` is O(K) in the subject's entries instead of O(N).
//!
//! # Invalidation vs. Eviction
//!
//! Invalidation is a correctness operation: after `invalidate_subject(s)`
//! returns, no decision computed before it will be served for `s`. Every
//! entry records the subject generation it was computed under, and entries
//! from an older generation are treated as misses. Eviction (TTL or
//! capacity) only bounds memory and is counted separately.
//!
//! # Key Design
//!
//! Cache keys include `(subject, permission, resource, context fingerprint)`
//! so decisions computed under different request contexts never collide.
//!
//! # Cache Safety
//!
//! By default, caching is **disabled** (`enabled: false`). Enable it only
//! when every grant mutation path calls `invalidate_subject` after commit.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsauthz_domain::cache::{CacheKey, DecisionCache, DecisionCacheConfig};
//!
//! let cache = DecisionCache::new(DecisionCacheConfig::default().with_enabled(true));
//! let key = CacheKey::new("user-1", PermissionRef::new("document", "READ"), None, None);
//! cache.insert(key.clone(), decision).await;
//! assert!(cache.get(&key).await.is_some());
//! ```

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::Expiry;

use crate::model::{Decision, PermissionRef, ResourceRef};

/// Configuration for the decision cache.
#[derive(Debug, Clone)]
pub struct DecisionCacheConfig {
    /// Whether caching is enabled.
    ///
    /// Defaults to `false`: a cached ALLOW can be served until invalidation
    /// or TTL expiry.
    pub enabled: bool,
    /// Maximum number of entries in the cache (LRU beyond this).
    pub max_capacity: u64,
    /// TTL used when no explicit TTL is given.
    pub default_ttl: Duration,
}

impl Default for DecisionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_capacity: 100_000,
            default_ttl: Duration::from_secs(30),
        }
    }
}

impl DecisionCacheConfig {
    /// Enables or disables caching.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Cache key that uniquely identifies a permission check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The subject being checked.
    pub subject_id: String,
    /// The permission being checked.
    pub permission: PermissionRef,
    /// The resource, if the check was resource-scoped.
    pub resource: Option<ResourceRef>,
    /// Canonical encoding of the request context, if any.
    pub context_fingerprint: Option<String>,
}

impl CacheKey {
    /// Creates a new cache key.
    pub fn new(
        subject_id: impl Into<String>,
        permission: PermissionRef,
        resource: Option<ResourceRef>,
        context_fingerprint: Option<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            permission,
            resource,
            context_fingerprint,
        }
    }
}

/// Snapshot of the invalidation state a decision was computed under.
///
/// Captured before reading grants; an insert carrying a stale generation is
/// refused so a check racing an invalidation cannot re-cache old evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeneration {
    epoch: u64,
    subject: u64,
}

#[derive(Debug, Clone)]
struct CachedDecision {
    decision: Decision,
    generation: CacheGeneration,
    ttl: Duration,
}

struct DecisionExpiry;

impl Expiry<CacheKey, CachedDecision> for DecisionExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedDecision,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CachedDecision,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

type SubjectIndex = DashMap<String, HashSet<CacheKey>>;

/// Drops `key` from the index, and the subject's set once it is empty.
fn unindex(index: &SubjectIndex, key: &CacheKey) {
    if let Some(mut keys) = index.get_mut(&key.subject_id) {
        keys.remove(key);
    }
    index.remove_if(&key.subject_id, |_, keys| keys.is_empty());
}

/// Concurrent decision cache with per-subject invalidation.
///
/// # Thread Safety
///
/// Fully thread-safe; share it behind an `Arc` across tasks. Entries for
/// different subjects never contend on a common lock.
pub struct DecisionCache {
    cache: Cache<CacheKey, CachedDecision>,
    config: DecisionCacheConfig,
    /// Secondary index: subject -> cache keys, for O(K) subject invalidation.
    by_subject: Arc<SubjectIndex>,
    /// Per-subject invalidation counters, reset by `invalidate_all`.
    generations: DashMap<String, u64>,
    /// Bumped by `invalidate_all`. Readers of `generations` hold it shared so
    /// the bump and the reset are seen together.
    epoch: RwLock<u64>,
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .field("subject_index_size", &self.by_subject.len())
            .finish()
    }
}

impl DecisionCache {
    /// Creates a new decision cache with the given configuration.
    pub fn new(config: DecisionCacheConfig) -> Self {
        let by_subject: Arc<SubjectIndex> = Arc::new(DashMap::new());
        let index = Arc::clone(&by_subject);

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(DecisionExpiry)
            .eviction_listener(move |key: Arc<CacheKey>, _value, cause| {
                let label = match cause {
                    RemovalCause::Expired => "expired",
                    RemovalCause::Size => "size",
                    // Explicit removals and replacements are not evictions.
                    _ => return,
                };
                metrics::counter!("rsauthz_cache_evictions_total", "cause" => label).increment(1);
                unindex(&index, &key);
            })
            .build();

        Self {
            cache,
            config,
            by_subject,
            generations: DashMap::new(),
            epoch: RwLock::new(0),
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &DecisionCacheConfig {
        &self.config
    }

    /// Returns whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the current generation for a subject.
    pub fn generation(&self, subject_id: &str) -> CacheGeneration {
        let epoch = self.epoch.read().unwrap_or_else(PoisonError::into_inner);
        CacheGeneration {
            epoch: *epoch,
            subject: self.generations.get(subject_id).map_or(0, |g| *g),
        }
    }

    /// Inserts a decision with the default TTL under the current generation.
    pub async fn insert(&self, key: CacheKey, decision: Decision) {
        let ttl = self.config.default_ttl;
        self.insert_with_ttl(key, decision, ttl).await;
    }

    /// Inserts a decision with an explicit TTL under the current generation.
    pub async fn insert_with_ttl(&self, key: CacheKey, decision: Decision, ttl: Duration) {
        let generation = self.generation(&key.subject_id);
        self.insert_if_current(key, decision, ttl, generation).await;
    }

    /// Inserts a decision only if the subject has not been invalidated since
    /// `generation` was captured.
    ///
    /// Returns `true` if the entry was stored. A zero TTL stores nothing.
    pub async fn insert_if_current(
        &self,
        key: CacheKey,
        decision: Decision,
        ttl: Duration,
        generation: CacheGeneration,
    ) -> bool {
        if ttl.is_zero() || self.generation(&key.subject_id) != generation {
            return false;
        }

        self.by_subject
            .entry(key.subject_id.clone())
            .or_default()
            .insert(key.clone());

        let entry = CachedDecision {
            decision,
            generation,
            ttl,
        };
        self.cache.insert(key, entry).await;
        true
    }

    /// Retrieves a cached decision.
    ///
    /// Returns `None` if the key is absent, expired, or was cached before the
    /// subject's last invalidation.
    ///
    /// # Metrics
    ///
    /// Records cache hit/miss to:
    /// - `rsauthz_cache_hits_total` - Incremented on cache hit
    /// - `rsauthz_cache_misses_total` - Incremented on cache miss
    pub async fn get(&self, key: &CacheKey) -> Option<Decision> {
        let result = match self.cache.get(key).await {
            Some(entry) if entry.generation == self.generation(&key.subject_id) => {
                Some(entry.decision)
            }
            Some(_) => {
                self.invalidate(key).await;
                None
            }
            None => None,
        };

        if result.is_some() {
            metrics::counter!("rsauthz_cache_hits_total").increment(1);
        } else {
            metrics::counter!("rsauthz_cache_misses_total").increment(1);
        }
        result
    }

    /// Removes a single cache entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        unindex(&self.by_subject, key);
        self.cache.invalidate(key).await;
    }

    /// Invalidates every entry for a subject.
    ///
    /// Must be called after a grant mutation affecting the subject has
    /// committed. The generation bump makes the invalidation take effect
    /// immediately; removing the indexed entries reclaims their memory.
    pub async fn invalidate_subject(&self, subject_id: &str) {
        {
            let _epoch = self.epoch.read().unwrap_or_else(PoisonError::into_inner);
            *self
                .generations
                .entry(subject_id.to_string())
                .or_insert(0) += 1;
        }
        metrics::counter!("rsauthz_cache_invalidations_total").increment(1);

        // Atomic remove so no concurrent insert can slip keys in between
        // reading and clearing the index.
        if let Some((_, keys_to_remove)) = self.by_subject.remove(subject_id) {
            for key in &keys_to_remove {
                self.cache.invalidate(key).await;
            }
        }
    }

    /// Drops every cached decision.
    ///
    /// The epoch bump supersedes every per-subject counter, so the counters
    /// are reset under the same lock.
    pub async fn invalidate_all(&self) {
        {
            let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
            *epoch += 1;
            self.generations.clear();
        }
        metrics::counter!("rsauthz_cache_invalidations_total").increment(1);
        self.by_subject.clear();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks.
    ///
    /// This triggers any pending evictions. Useful for testing TTL behavior.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

/// Registers decision cache metrics descriptions.
///
/// Call once during application startup, after installing a metrics recorder.
///
/// # Metrics Registered
///
/// - `rsauthz_cache_hits_total` - Total number of decision cache hits
/// - `rsauthz_cache_misses_total` - Total number of decision cache misses
/// - `rsauthz_cache_evictions_total` - Entries dropped by TTL or capacity, by cause
/// - `rsauthz_cache_invalidations_total` - Subject-wide or full invalidations
/// - `rsauthz_decisions_total` - Permission checks, by outcome
pub fn register_decision_cache_metrics() {
    metrics::describe_counter!(
        "rsauthz_cache_hits_total",
        "Total number of decision cache hits"
    );
    metrics::describe_counter!(
        "rsauthz_cache_misses_total",
        "Total number of decision cache misses"
    );
    metrics::describe_counter!(
        "rsauthz_cache_evictions_total",
        "Decision cache entries evicted by TTL or capacity"
    );
    metrics::describe_counter!(
        "rsauthz_cache_invalidations_total",
        "Decision cache invalidations triggered by grant mutations"
    );
    metrics::describe_counter!(
        "rsauthz_decisions_total",
        "Permission checks by outcome (allow, deny, error)"
    );
}
