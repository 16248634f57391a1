//! Error types for the query layer.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while building or evaluating queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The filter string is not valid JSON or has the wrong shape.
    #[error("malformed filter: {0}")]
    MalformedFilter(#[from] serde_json::Error),

    /// The property does not exist on the entity type.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// Aggregation over a property that is not numeric.
    #[error("property is not numeric: {0}")]
    NotNumeric(String),

    /// Integer or decimal aggregation overflowed.
    #[error("aggregate overflow on {0}")]
    Overflow(String),
}
