//! Error types for the repository layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use unitwork_model::GraphNode;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A named validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Property (or rule) the failure is about.
    pub name: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The failure recorded when a filter vetoes validation or persistence.
    pub fn vetoed(stage: &str) -> Self {
        Self::new("vetoed", format!("operation vetoed by a filter during {stage}"))
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Errors that can occur in repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Validation failed. Only produced by `OperationResult::into_result`;
    /// the operations themselves return failures inside their result.
    #[error("validation failed: {}", .0.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ValidationFailure>),

    /// An access checker rejected an entity.
    #[error("access denied to {entity_type} {id}")]
    AccessDenied { entity_type: String, id: String },

    /// The persisted state changed underneath the unit of work.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The unit-of-work lock was not acquired in time.
    #[error("timed out after {0:?} waiting for the unit-of-work lock")]
    LockTimeout(Duration),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The entity graph or call sequence cannot be handled.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RepositoryError {
    /// Access denied for a specific entity.
    pub fn access_denied(entity: &dyn GraphNode) -> Self {
        Self::AccessDenied {
            entity_type: entity.entity_type().to_string(),
            id: entity.key().to_string(),
        }
    }

    /// Wraps any backend error.
    pub fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Backend(Box::new(err))
    }
}

impl From<unitwork_query::QueryError> for RepositoryError {
    fn from(err: unitwork_query::QueryError) -> Self {
        Self::InvalidOperation(err.to_string())
    }
}

impl From<unitwork_types::TypesError> for RepositoryError {
    fn from(err: unitwork_types::TypesError) -> Self {
        Self::InvalidOperation(err.to_string())
    }
}
