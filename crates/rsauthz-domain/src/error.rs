//! Domain error types for permission decisions.

use thiserror::Error;

use crate::condition::ConditionError;

/// Domain-specific errors for permission decisions.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The grant store could not be reached or did not answer in time.
    ///
    /// Never conflated with "no grants": callers decide whether to retry
    /// or to treat the subject as denied.
    #[error("grant store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// A grant's conditions compared incomparable types.
    #[error("condition evaluation failed for grant '{grant_id}': {source}")]
    EvaluationError {
        grant_id: String,
        #[source]
        source: ConditionError,
    },

    /// A grant record violates a data invariant.
    #[error("invalid grant data for grant '{grant_id}': {message}")]
    InvalidGrantData { grant_id: String, message: String },

    /// Invalid subject identifier.
    #[error("invalid subject: {value:?}")]
    InvalidSubject { value: String },

    /// Invalid permission reference.
    #[error("invalid permission reference: {value:?}")]
    InvalidPermission { value: String },

    /// Invalid resource reference.
    #[error("invalid resource: {message}")]
    InvalidResource { message: String },
}

impl DomainError {
    /// Returns true if the error came from the backing store rather than
    /// from the request or the grant data.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, DomainError::StoreUnavailable { .. })
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
