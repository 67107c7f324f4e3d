//! Condition-specific error types

use thiserror::Error;

/// Errors that can occur while parsing or evaluating grant conditions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    /// The condition document is not a valid predicate
    #[error("Invalid condition for key '{key}': {message}")]
    InvalidExpression {
        /// The condition key the error relates to
        key: String,
        /// Description of the problem
        message: String,
    },

    /// An operator object used an operator outside the supported set
    #[error("Unknown operator '{operator}' for key '{key}'")]
    UnknownOperator {
        /// The condition key the error relates to
        key: String,
        /// The operator as written
        operator: String,
    },

    /// An operator compared values whose types have no common ordering
    #[error("Cannot apply {operator} to '{key}': {left} is not comparable with {right}")]
    IncomparableTypes {
        /// The condition key the error relates to
        key: String,
        /// The operator being applied
        operator: String,
        /// Type of the context value
        left: String,
        /// Type of the condition operand
        right: String,
    },

    /// A request context value is not a scalar
    #[error("Invalid context value for '{key}': {message}")]
    InvalidContext {
        /// The context key
        key: String,
        /// Description of the problem
        message: String,
    },
}
