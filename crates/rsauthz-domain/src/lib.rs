//! rsauthz-domain: Permission decision engine
//!
//! This crate contains the core authorization logic including:
//! - Grant and decision value types
//! - Condition evaluation against a request context
//! - Precedence resolution (deny wins, implicit deny)
//! - Decision caching with subject-wide invalidation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsauthz-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/     - Grants, permissions, decisions│
//! │  condition/ - Condition evaluator           │
//! │  resolver/  - Precedence resolver & engine  │
//! │  cache/     - Decision caching              │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod condition;
pub mod error;
pub mod model;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use cache::{CacheKey, DecisionCache, DecisionCacheConfig};
pub use error::{DomainError, DomainResult};
pub use model::{Decision, Grant, GrantScope, GrantSource, PermissionRef, Polarity, ResourceRef};
pub use resolver::{CheckRequest, GrantStore, PermissionEngine, ResolverConfig};
