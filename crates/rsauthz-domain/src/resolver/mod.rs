//! Permission resolution.
//!
//! The engine fetches candidate grants for a check from a [`GrantStore`],
//! resolves them with a fixed precedence and optionally caches the result.
//!
//! # Architecture
//!
//! ```text
//! CheckRequest ─► PermissionEngine ─► DecisionCache (hit?) ─► Decision
//!                       │
//!                       ▼
//!                 GrantStore::fetch_candidate_grants
//!                       │
//!                       ▼
//!                 precedence::resolve ─► Decision
//! ```
//!
//! # Precedence
//!
//! - An applicable DENY always wins over any ALLOW
//! - No applicable grant means deny (`reason = "no applicable grant"`)
//! - The reported grant is the most specific of the winning polarity

mod config;
mod engine;
mod precedence;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use config::ResolverConfig;
pub use engine::{CacheMetrics, CacheMetricsSnapshot, PermissionEngine};
pub use precedence::{next_transition, resolve};
pub use traits::GrantStore;
pub use types::CheckRequest;
