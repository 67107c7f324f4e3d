//! rsauthz-server: Service layer around the permission engine
//!
//! This crate wires storage to the decision engine and owns every
//! mutation of authorization data:
//! - Configuration loading (defaults, YAML file, environment)
//! - Structured logging and audit events
//! - The grant store adapter over `DataStore`
//! - Grant administration with post-commit cache invalidation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsauthz-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  logging.rs  - Tracing subscriber, audit    │
//! │  adapters.rs - DataStore -> GrantStore      │
//! │  handlers/   - Grant administration         │
//! │  service.rs  - Service assembly             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod service;

// Re-exports for convenience
pub use adapters::DataStoreGrantStore;
pub use config::{ConfigLoadError, ServiceConfig};
pub use handlers::{AdminError, AdminResult, GrantAdministration};
pub use logging::{init_logging, LoggingConfig};
pub use service::AuthzService;
