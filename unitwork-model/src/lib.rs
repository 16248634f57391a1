//! Core entity model for unitwork.
//!
//! Defines the universal types that the repository engine and every backend
//! depend on:
//! - [`Entity`] / [`GraphNode`]: typed entities and their object-safe graph
//!   view (scalars, single references, collections)
//! - [`DynEntity`]: the type-erased handle given to polymorphic hooks
//! - [`EntitySchema`]: declares an entity type's properties and their kinds
//! - [`Comparer`]: structural difference engine over two instances
//! - [`PropertyChange`] / [`RepositoryRecord`]: the change vocabulary
//! - [`KeyAssignments`]: keys assigned on save, written back into the graph
//!
//! Graph walking never relies on reflection: each entity type states its
//! navigations explicitly through [`GraphNode`].

mod change;
mod compare;
mod entity;
mod keys;
mod schema;

pub use change::{compute_changes, ChangeType, PropertyChange, RecordRef, RepositoryRecord};
pub use compare::{Comparer, Difference, DifferenceKind};
pub use entity::{Collection, DynEntity, Entity, GraphNode, Properties, Reference};
pub use keys::KeyAssignments;
pub use schema::{EntitySchema, PropertyDescriptor, PropertyKind, ScalarType};
