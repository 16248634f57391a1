//! Generic repository engine for unitwork.
//!
//! [`Repository`] is the persistence-agnostic CRUD and query orchestrator.
//! It owns the snapshots of one unit of work, runs the filter, validation
//! and access pipelines around every mutation, buffers batches and wraps
//! backend transactions. The actual I/O is delegated to a [`Backend`],
//! assembled from the [`Loader`], [`Aggregator`], [`Mutator`] and
//! [`Transactional`] capabilities.

mod access;
mod backend;
mod config;
mod error;
mod filters;
mod lock;
mod repository;
mod result;
mod services;
mod snapshot;
mod sum;
mod validation;

pub use access::{AccessChecker, AllowAll};
pub use backend::{Aggregator, Backend, Loader, Mutator, SaveSummary, Transactional};
pub use config::RepositoryConfig;
pub use error::{RepositoryError, RepositoryResult, ValidationFailure};
pub use filters::{EntityFilter, FiltersManager, FiltersManagerBuilder, RepositoryFilter, TypedFilter};
pub use lock::{UnitLock, UnitPermit};
pub use repository::Repository;
pub use result::OperationResult;
pub use services::Services;
pub use snapshot::SnapshotStore;
pub use sum::Summable;
pub use validation::{EntityValidator, TypedValidator, ValidationContext, Validator, ValidatorRegistry};
