//! Grant, permission and decision types.
//!
//! This module contains:
//! - Permission and resource references
//! - The Grant record and its specificity ordering
//! - The Decision returned by permission checks

mod types;
#[cfg(test)]
mod types_proptest;

pub use types::*;
