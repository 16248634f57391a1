//! One tracked unit of work over a row store.

use crate::known::KnownReferences;
use crate::materialize::assemble;
use crate::reconciler::{AttachMode, AttachReport, GraphReconciler};
use crate::row::{ChangeSet, Row};
use crate::store::RowStore;
use crate::tracker::ChangeTracker;
use crate::TrackingResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};
use unitwork_model::{Entity, EntitySchema, GraphNode};
use unitwork_query::IncludeTree;
use unitwork_repo::{SaveSummary, UnitLock};
use unitwork_types::NodeKey;

/// Entity schemas known to a session, used to follow nested includes.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<&'static str, &'static EntitySchema>>,
}

impl SchemaRegistry {
    pub fn register(&self, schema: &'static EntitySchema) {
        self.schemas
            .write()
            .unwrap()
            .insert(schema.entity_type(), schema);
    }

    pub fn get(&self, entity_type: &str) -> Option<&'static EntitySchema> {
        self.schemas.read().unwrap().get(entity_type).copied()
    }
}

struct SessionInner<S> {
    store: S,
    tracker: tokio::sync::Mutex<ChangeTracker>,
    lock: UnitLock,
    schemas: SchemaRegistry,
    last_report: Mutex<Option<AttachReport>>,
}

/// A store plus the change tracker of one unit of work. Cheap to clone;
/// every backend built from the same session shares its tracker and lock.
pub struct TrackedSession<S> {
    inner: Arc<SessionInner<S>>,
}

impl<S> Clone for TrackedSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RowStore> TrackedSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                tracker: tokio::sync::Mutex::new(ChangeTracker::new()),
                lock: UnitLock::new(),
                schemas: SchemaRegistry::default(),
                last_report: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn unit_lock(&self) -> UnitLock {
        self.inner.lock.clone()
    }

    /// Makes a schema available for nested includes.
    pub fn register(&self, schema: &'static EntitySchema) {
        self.inner.schemas.register(schema);
    }

    /// The report of the most recent attach.
    pub fn last_report(&self) -> Option<AttachReport> {
        self.inner.last_report.lock().unwrap().clone()
    }

    /// Reconciles `root` into the tracker. A failed attach leaves the
    /// tracker as it was.
    pub async fn attach(
        &self,
        root: &dyn GraphNode,
        base: Option<&dyn GraphNode>,
        mode: AttachMode,
    ) -> TrackingResult<AttachReport> {
        let known = base.map(KnownReferences::from_base).unwrap_or_default();
        let mut tracker = self.inner.tracker.lock().await;
        let before = tracker.clone();
        let outcome = GraphReconciler::new(&self.inner.store, &mut tracker, &known)
            .attach(root, mode)
            .await;
        match outcome {
            Ok(report) => {
                *self.inner.last_report.lock().unwrap() = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                *tracker = before;
                Err(e)
            }
        }
    }

    pub async fn mark_deleted(&self, node: NodeKey) {
        debug!("Marking {} deleted", node);
        self.inner.tracker.lock().await.mark_deleted(node);
    }

    /// The writes the next save would perform.
    pub async fn pending(&self) -> ChangeSet {
        self.inner.tracker.lock().await.change_set()
    }

    /// Applies every tracked change. The tracker is cleared on success and
    /// kept on failure.
    pub async fn save(&self) -> TrackingResult<SaveSummary> {
        let mut tracker = self.inner.tracker.lock().await;
        let changes = tracker.change_set();
        if changes.is_empty() {
            tracker.clear();
            return Ok(SaveSummary::default());
        }
        let summary = self.inner.store.apply(&changes).await?;
        tracker.clear();
        info!(
            "Saved unit of work: {} inserted, {} updated, {} deleted",
            summary.inserted, summary.updated, summary.deleted
        );
        Ok(summary)
    }

    pub async fn discard(&self) {
        let mut tracker = self.inner.tracker.lock().await;
        if !tracker.is_empty() {
            debug!("Discarding {} tracked entr(ies)", tracker.len());
        }
        tracker.clear();
    }

    /// Materializes an entity from a stored row, loading `includes`.
    pub async fn materialize<E: Entity>(&self, row: Row, includes: &IncludeTree) -> TrackingResult<E> {
        let value = assemble(
            &self.inner.store,
            &self.inner.schemas,
            E::schema(),
            row.node,
            row.scalars,
            includes,
        )
        .await?;
        Ok(serde_json::from_value(value)?)
    }
}
