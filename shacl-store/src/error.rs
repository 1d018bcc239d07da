//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the storage surface
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed declarative query text. The offending query is attached
    /// so a failed validation run can be diagnosed from the error alone.
    #[error("Malformed query: {message}\nquery: {query}")]
    MalformedQuery { query: String, message: String },

    /// The query referenced a variable that never occurs in its patterns
    #[error("Unknown variable ?{variable} in query: {query}")]
    UnknownVariable { variable: String, query: String },

    /// Backend evaluation failure
    #[error("Query evaluation failed: {0}")]
    Evaluation(String),
}
