//! Error types for the tracking backend.

use thiserror::Error;
use unitwork_repo::RepositoryError;
use unitwork_types::{NodeKey, TypesError};

/// Result type for tracking operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Errors that can occur while tracking, reconciling or persisting rows.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The row store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A navigation was used with a shape it is not persisted as, e.g. a
    /// collection operation on a single reference.
    #[error("unsupported relation {entity_type}.{property}: {detail}")]
    UnsupportedRelation {
        entity_type: String,
        property: String,
        detail: String,
    },

    /// An insert collided with an existing row.
    #[error("duplicate key: {0}")]
    DuplicateKey(NodeKey),

    /// A row expected to exist was removed underneath the unit of work.
    #[error("concurrency conflict: {0} no longer exists")]
    ConcurrencyConflict(NodeKey),

    /// A key could not be converted.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypesError),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TrackingError {
    pub(crate) fn unsupported(entity_type: &str, property: &str, detail: impl Into<String>) -> Self {
        Self::UnsupportedRelation {
            entity_type: entity_type.to_string(),
            property: property.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<TrackingError> for RepositoryError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::UnsupportedRelation { .. } | TrackingError::InvalidKey(_) => {
                RepositoryError::InvalidOperation(err.to_string())
            }
            TrackingError::ConcurrencyConflict(_) => RepositoryError::Concurrency(err.to_string()),
            other => RepositoryError::backend(other),
        }
    }
}
