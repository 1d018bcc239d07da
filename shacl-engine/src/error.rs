//! Engine error types

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ShaclError>;

/// Errors raised while compiling or executing validation plans
#[derive(Debug, Error)]
pub enum ShaclError {
    /// Malformed declarative query text, fatal for the run. The offending
    /// query travels with the error for diagnosis.
    #[error("Query failed during validation: {0}")]
    Query(#[from] shacl_store::StoreError),

    /// Invalid regex in sh:pattern; detected at plan-build time
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A constraint parameter the engine does not support. At compile time
    /// this deactivates the shape instead of propagating.
    #[error("Unsupported constraint on shape {shape}: {message}")]
    UnsupportedShape { shape: String, message: String },

    /// Cooperative cancellation, distinct from storage failure so callers
    /// can tell "cancelled" from "failed"
    #[error("Validation interrupted")]
    Interrupted,
}
