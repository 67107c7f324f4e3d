//! Service assembly.
//!
//! Builds the storage backend named in the configuration and wires the
//! engine and the administration service on top of it, sharing one store.
//!
//! ```ignore
//! let config = ServiceConfig::load("rsauthz.yaml")?;
//! init_logging(config.logging_config());
//! let service = AuthzService::from_config(&config)?;
//!
//! service.admin.assign_role("admin", RoleAssignment::new("alice", "viewer")).await?;
//! let decision = service.engine.authorize(&request).await;
//! ```

use std::sync::Arc;

use rsauthz_domain::cache::register_decision_cache_metrics;
use rsauthz_domain::resolver::PermissionEngine;
use rsauthz_storage::{DataStore, MemoryDataStore};
use tracing::info;

use crate::adapters::DataStoreGrantStore;
use crate::config::{ConfigLoadError, ServiceConfig};
use crate::handlers::GrantAdministration;

/// The engine type served over a `DataStore`.
pub type StoreEngine<S> = PermissionEngine<DataStoreGrantStore<S>>;

/// An engine and its administration service over one shared store.
pub struct AuthzService<S: DataStore> {
    pub store: Arc<S>,
    pub engine: Arc<StoreEngine<S>>,
    pub admin: GrantAdministration<S, DataStoreGrantStore<S>>,
}

impl<S: DataStore> AuthzService<S> {
    /// Wires a service over an existing store.
    pub fn new(store: Arc<S>, config: &ServiceConfig) -> Self {
        let grants = Arc::new(DataStoreGrantStore::new(Arc::clone(&store)));
        let engine = Arc::new(PermissionEngine::with_config(
            grants,
            config.resolver_config(),
        ));
        let admin = GrantAdministration::new(Arc::clone(&store), Arc::clone(&engine));
        Self {
            store,
            engine,
            admin,
        }
    }
}

impl AuthzService<MemoryDataStore> {
    /// Builds the service for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError::Invalid` when the configuration does not
    /// validate or names a backend other than `memory`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigLoadError> {
        config.validate()?;
        match config.storage.backend.as_str() {
            "memory" => {
                info!(
                    cache_enabled = config.cache.enabled,
                    store_timeout_ms = config.resolver.store_timeout_ms,
                    "using in-memory storage backend"
                );
                register_decision_cache_metrics();
                Ok(Self::new(Arc::new(MemoryDataStore::new()), config))
            }
            other => Err(ConfigLoadError::Invalid {
                message: format!("unknown storage backend: {other}"),
            }),
        }
    }
}
