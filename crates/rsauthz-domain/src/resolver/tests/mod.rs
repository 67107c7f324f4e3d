//! Tests for the permission engine.
//!
//! Organized by functionality:
//! - Precedence resolution (deny wins, implicit deny, specificity)
//! - Temporal validity
//! - Conditions
//! - Engine behavior (validation, store failures, fail-closed)
//! - Decision caching and invalidation


#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod resolver_tests;
