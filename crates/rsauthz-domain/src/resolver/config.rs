//! Configuration for the permission engine.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::DecisionCache;

/// Configuration for the permission engine.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound on a single grant store query.
    ///
    /// A query that does not finish in time surfaces as
    /// `DomainError::StoreUnavailable`.
    pub store_timeout: Duration,
    /// Optional decision cache.
    ///
    /// When present and enabled, the engine will:
    /// 1. Return cached decisions for repeated checks
    /// 2. Store fresh decisions, with the TTL capped at the next validity
    ///    boundary among the candidate grants
    ///
    /// Point-in-time checks (`CheckRequest::at`) bypass the cache.
    pub cache: Option<Arc<DecisionCache>>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            cache: None,
        }
    }
}

impl ResolverConfig {
    /// Creates a new configuration with caching enabled.
    pub fn with_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Creates a new configuration with the specified store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}
