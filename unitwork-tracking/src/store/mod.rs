//! Row persistence.
//!
//! A [`RowStore`] is the physical session behind a tracked unit of work.
//! Every method is one round trip; the reconciler counts them.

mod memory;
mod sqlite;

pub use memory::{MemoryRowStore, StoreStats};
pub use sqlite::SqliteRowStore;

use crate::row::{ChangeSet, Row};
use crate::TrackingResult;
use async_trait::async_trait;
use serde_json::Value;
use unitwork_model::{EntitySchema, Properties};
use unitwork_query::QuerySpec;
use unitwork_repo::SaveSummary;
use unitwork_types::NodeKey;

#[async_trait]
pub trait RowStore: Send + Sync {
    /// The persisted scalar values of one row.
    async fn fetch(&self, node: &NodeKey) -> TrackingResult<Option<Properties>>;

    /// The current target of a single reference.
    async fn load_reference(&self, node: &NodeKey, property: &str) -> TrackingResult<Option<NodeKey>>;

    /// The current members of a collection, in stored order.
    async fn load_collection(&self, node: &NodeKey, property: &str) -> TrackingResult<Vec<NodeKey>>;

    /// Rows of `schema`'s type matching the query's filter, order and page.
    /// Includes are ignored.
    async fn select(&self, schema: &EntitySchema, spec: &QuerySpec) -> TrackingResult<Vec<Row>>;

    async fn count(&self, schema: &EntitySchema, spec: &QuerySpec) -> TrackingResult<u64> {
        Ok(self.select(schema, spec).await?.len() as u64)
    }

    /// Values of one scalar property over the selected rows.
    async fn scalar_values(&self, schema: &EntitySchema, spec: &QuerySpec, property: &str) -> TrackingResult<Vec<Value>> {
        Ok(self
            .select(schema, spec)
            .await?
            .into_iter()
            .map(|row| row.scalars.value(property).clone())
            .collect())
    }

    /// Reserves the next integer key for `entity_type`.
    async fn next_key(&self, entity_type: &str) -> TrackingResult<i64>;

    /// Writes a change set atomically.
    async fn apply(&self, changes: &ChangeSet) -> TrackingResult<SaveSummary>;

    async fn begin(&self) -> TrackingResult<()>;

    async fn commit(&self) -> TrackingResult<()>;

    async fn rollback(&self) -> TrackingResult<()>;

    fn in_transaction(&self) -> bool;
}
