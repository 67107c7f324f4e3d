//! Condition evaluation module
//!
//! Grants may carry a structured predicate that must hold against the
//! request context for the grant to apply. This enables attribute-based
//! restrictions on top of role and resource grants.
//!
//! # Example
//!
//! ```text
//! // Grant conditions
//! {"department": "finance", "amount": {"$lte": 1000}}
//!
//! // Check context
//! {"department": "finance", "amount": 250}   -> true
//! {"department": "finance"}                  -> false (missing key)
//! {"department": "finance", "amount": "250"} -> EvaluationError
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Condition Module                │
//! ├─────────────────────────────────────────────┤
//! │  Conditions       - Parsed predicate set    │
//! │  ConditionContext - Request variables       │
//! │  ConditionValue   - Scalar values           │
//! │  ConditionError   - Parse/evaluation errors │
//! └─────────────────────────────────────────────┘
//! ```

mod context;
mod error;
mod expression;

pub use context::{ConditionContext, ConditionValue};
pub use error::ConditionError;
pub use expression::{evaluate, Conditions, Operator, Predicate};

/// Result type for condition operations
pub type ConditionResult<T> = Result<T, ConditionError>;
