//! Change-tracking backend for unitwork.
//!
//! This crate provides the relational, ORM-style backend of the repository
//! engine: a [`TrackedSession`] owns a [`RowStore`] and a [`ChangeTracker`],
//! and [`TrackedBackend`] implements the repository capabilities over it.
//!
//! Updates of disconnected graphs go through the [`GraphReconciler`], which
//! fetches one persisted row per node and uses the caller's base snapshot
//! ([`KnownReferences`]) to decide which references and collections the
//! client actually saw. Two stores are included:
//! - [`MemoryRowStore`] for tests and embedded use
//! - [`SqliteRowStore`] on `rusqlite`, compiling queries to SQL

mod backend;
mod error;
mod known;
mod materialize;
mod reconciler;
mod row;
mod session;
mod store;
mod tracker;

pub use backend::TrackedBackend;
pub use error::{TrackingError, TrackingResult};
pub use known::{EntityReference, KnownReferences};
pub use reconciler::{AttachMode, AttachReport, Decision, GraphReconciler, NodeDecision};
pub use row::{ChangeSet, CollectionDelta, RelationKind, Row, RowInsert, RowUpdate};
pub use session::{SchemaRegistry, TrackedSession};
pub use store::{MemoryRowStore, RowStore, SqliteRowStore, StoreStats};
pub use tracker::{ChangeTracker, EntryState, TrackedEntry};
