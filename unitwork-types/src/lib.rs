//! Core identifier types for unitwork.
//!
//! This crate defines the storage-neutral identity vocabulary used by every
//! other crate in the workspace:
//! - [`EntityId`]: a UUID v7 newtype for entities that mint their own ids
//! - [`Identity`]: the contract every entity key type fulfils
//! - [`KeyValue`]: a key lowered to a form any backend can store and compare
//! - [`NodeKey`]: a key qualified by its entity type, used by graph walks

mod ids;
mod key;

pub use ids::EntityId;
pub use key::{Identity, KeyValue, NodeKey};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("key {key} cannot be converted to {target}")]
    KeyMismatch { key: String, target: &'static str },
}
