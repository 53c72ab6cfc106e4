//! Error types for lobbygraph.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error
//! messages.
//!
//! Note the taxonomy: non-matches are not errors. A reference that
//! resolves to nothing, or a name that is ambiguous, is a deliberate
//! outcome reported through counters, never through these types.

use thiserror::Error;

pub use crate::storage::StorageError;

/// Validation errors that occur while constructing graph values.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Tenant code was empty after trimming.
    #[error("Tenant code cannot be empty")]
    EmptyTenantCode,

    /// Event kind string was empty.
    #[error("Event kind cannot be empty")]
    EmptyEventKind,

    /// Edge label string was empty.
    #[error("Edge label cannot be empty")]
    EmptyEdgeLabel,

    /// Record carried no usable external id.
    #[error("Record external id cannot be empty")]
    EmptyExternalId,

    /// The endpoint XOR rule was violated.
    #[error("Edge must have exactly one 'to' endpoint and at most one 'from' endpoint (from columns set: {from_set}, to columns set: {to_set})")]
    EdgeEndpointConflict {
        /// How many `from` columns were set.
        from_set: usize,
        /// How many `to` columns were set.
        to_set: usize,
    },

    /// An edge referenced a stub handle the bundle does not contain.
    #[error("Edge references unknown bundle handle: {handle}")]
    UnknownHandle {
        /// Description of the dangling handle.
        handle: String,
    },
}

/// Top-level error type for lobbygraph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A value failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The storage backend reported an error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl GraphError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for lobbygraph operations.
pub type GraphResult<T> = Result<T, GraphError>;
