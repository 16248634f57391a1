//! Capabilities a storage backend provides to the repository.
//!
//! The repository never assumes SQL, HTTP or any wire format; it only calls
//! these traits. A backend that implements all four is a [`Backend`].

use crate::{RepositoryResult, UnitLock};
use async_trait::async_trait;
use unitwork_model::{Entity, KeyAssignments};
use unitwork_query::{Query, Total};

/// What one backend save wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Reads entities.
#[async_trait]
pub trait Loader<E: Entity>: Send + Sync {
    /// A fresh query for this entity type.
    fn create_query(&self) -> Query<E> {
        Query::new()
    }

    /// First entity matching the query.
    async fn get(&self, query: &Query<E>) -> RepositoryResult<Option<E>>;

    /// Every entity matching the query.
    async fn get_all(&self, query: &Query<E>) -> RepositoryResult<Vec<E>>;

    /// The currently persisted state of one entity, without navigations.
    async fn get_persisted(&self, id: &E::Id) -> RepositoryResult<Option<E>>;
}

/// Aggregates over a query.
#[async_trait]
pub trait Aggregator<E: Entity>: Send + Sync {
    async fn count(&self, query: &Query<E>) -> RepositoryResult<u64>;

    /// Sum of a numeric property; `None` when no row has a value.
    async fn sum(&self, query: &Query<E>, property: &str) -> RepositoryResult<Option<Total>>;
}

/// Stages and persists changes.
///
/// `add`, `update` and `delete` only stage; nothing is written until
/// `save`.
#[async_trait]
pub trait Mutator<E: Entity>: Send + Sync {
    /// Stages a new entity graph. Nodes with unset keys get one assigned;
    /// the assignments are returned for write-back into `entity`.
    async fn add(&self, entity: &E) -> RepositoryResult<KeyAssignments>;

    /// Attaches a disconnected entity graph and stages its changes. `base`
    /// is what the caller originally loaded, if known.
    async fn update(&self, entity: &E, base: Option<&E>) -> RepositoryResult<KeyAssignments>;

    async fn delete(&self, entity: &E) -> RepositoryResult<()>;

    /// Writes everything staged, atomically.
    async fn save(&self) -> RepositoryResult<SaveSummary>;

    /// Drops everything staged.
    async fn discard(&self);
}

/// Native transactions of the backend session.
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn begin(&self) -> RepositoryResult<()>;

    async fn commit(&self) -> RepositoryResult<()>;

    async fn rollback(&self) -> RepositoryResult<()>;

    fn in_transaction(&self) -> bool;

    /// The lock serializing access to the session.
    fn unit_lock(&self) -> UnitLock;
}

/// A complete backend for entity type `E`.
pub trait Backend<E: Entity>: Loader<E> + Aggregator<E> + Mutator<E> + Transactional {}

impl<E: Entity, T> Backend<E> for T where T: Loader<E> + Aggregator<E> + Mutator<E> + Transactional {}
