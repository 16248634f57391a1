//! The generic repository.
//!
//! `Repository<E, B>` orchestrates one unit of work for entity type `E`
//! over a backend `B`:
//!
//! - loads take a snapshot of every returned entity and run `after_load`
//! - `add` / `update` run `before_validate`, validation, `before_save`,
//!   stage the change in the backend, then save (or defer to the open
//!   batch) and finally run `after_save` and refresh the snapshot
//! - `update` short-circuits when nothing changed against its baseline
//! - every backend call holds the session's [`UnitLock`] and honours the
//!   caller's cancellation token
//!
//! A repository is owned by one logical unit of work and takes `&mut self`
//! for anything touching its snapshots or batch.

use crate::backend::{Backend, SaveSummary};
use crate::lock::cancellable;
use crate::{
    OperationResult, RepositoryError, RepositoryResult, Services, SnapshotStore, Summable, UnitLock,
    ValidationContext, ValidationFailure,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unitwork_model::{Comparer, DynEntity, Entity, GraphNode, Properties, PropertyChange, RepositoryRecord};
use unitwork_query::Query;
use unitwork_types::{Identity, KeyValue};

/// A mutation deferred by an open batch.
enum Staged<E: Entity> {
    Saved(RepositoryRecord<E>),
    Deleted(E::Id),
}

pub struct Repository<E: Entity, B: Backend<E>> {
    backend: B,
    services: Arc<Services>,
    comparer: Comparer,
    snapshots: SnapshotStore<E>,
    batch: Option<Vec<Staged<E>>>,
    lock: UnitLock,
}

impl<E: Entity, B: Backend<E>> Repository<E, B> {
    pub fn new(backend: B, services: Arc<Services>) -> Self {
        let lock = backend.unit_lock();
        let comparer = services.config.comparer();
        Self {
            backend,
            services,
            comparer,
            snapshots: SnapshotStore::new(),
            batch: None,
            lock,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// The snapshot taken when `id` was last loaded or saved.
    pub fn snapshot(&self, id: &E::Id) -> Option<&E> {
        self.snapshots.get(id)
    }

    /// A deep clone of `entity`, independent of the snapshot map, for use
    /// as the base of a later [`Repository::update_external`].
    pub fn create_snapshot(&self, entity: &E) -> E {
        entity.clone()
    }

    pub fn query(&self) -> Query<E> {
        self.backend.create_query()
    }

    fn timeout(&self) -> Duration {
        self.services.config.lock_timeout()
    }

    /// Runs a backend call under the unit-of-work lock.
    async fn locked<T, F>(&self, cancel: &CancellationToken, fut: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        let _permit = self.lock.acquire(self.timeout(), cancel).await?;
        cancellable(cancel, fut).await
    }

    /// Saves everything staged in the backend. A failed save discards the
    /// staged changes before the error is returned.
    async fn save_now(&self, cancel: &CancellationToken) -> RepositoryResult<SaveSummary> {
        let _permit = self.lock.acquire(self.timeout(), cancel).await?;
        match cancellable(cancel, self.backend.save()).await {
            Ok(summary) => {
                debug!(
                    "Saved {} insert(s), {} update(s), {} delete(s) for {}",
                    summary.inserted,
                    summary.updated,
                    summary.deleted,
                    E::schema().entity_type()
                );
                Ok(summary)
            }
            Err(e) => {
                self.backend.discard().await;
                Err(e)
            }
        }
    }

    /// Access checks, `after_load` and snapshots for freshly loaded entities.
    /// The snapshot holds the entity as `after_load` left it.
    async fn loaded(&mut self, mut entities: Vec<E>, cancel: &CancellationToken) -> RepositoryResult<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        {
            let erased: Vec<&dyn DynEntity> = entities.iter().map(|e| e as &dyn DynEntity).collect();
            cancellable(cancel, self.services.access.check(&erased)).await?;
        }
        let services = Arc::clone(&self.services);
        for entity in &mut entities {
            services.filters.after_load(entity).await?;
            self.snapshots.insert(entity);
        }
        Ok(entities)
    }

    // ── Loads ────────────────────────────────────────────────────

    /// A fresh entity with filter-supplied defaults.
    pub async fn new_entity(&self, cancel: &CancellationToken) -> RepositoryResult<E> {
        let mut entity = E::default();
        cancellable(cancel, self.services.filters.after_load(&mut entity)).await?;
        Ok(entity)
    }

    pub async fn get(&mut self, query: Query<E>, cancel: &CancellationToken) -> RepositoryResult<Option<E>> {
        let found = self.locked(cancel, self.backend.get(&query)).await?;
        match found {
            Some(entity) => Ok(self.loaded(vec![entity], cancel).await?.pop()),
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&mut self, id: &E::Id, cancel: &CancellationToken) -> RepositoryResult<Option<E>> {
        let query = self.query().by_id(id);
        self.get(query, cancel).await
    }

    /// Loads by id with extra query configuration, typically includes.
    pub async fn get_by_id_with(
        &mut self,
        id: &E::Id,
        configure: impl FnOnce(Query<E>) -> Query<E> + Send,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        let query = configure(self.query().by_id(id));
        self.get(query, cancel).await
    }

    pub async fn get_all(&mut self, query: Query<E>, cancel: &CancellationToken) -> RepositoryResult<Vec<E>> {
        let found = self.locked(cancel, self.backend.get_all(&query)).await?;
        self.loaded(found, cancel).await
    }

    pub async fn get_by_ids(&mut self, ids: &[E::Id], cancel: &CancellationToken) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.query().by_ids(ids);
        self.get_all(query, cancel).await
    }

    // ── Aggregates ───────────────────────────────────────────────

    pub async fn count(&self, query: Query<E>, cancel: &CancellationToken) -> RepositoryResult<u64> {
        self.locked(cancel, self.backend.count(&query)).await
    }

    /// Sums a numeric property. `T` decides the empty-set behaviour:
    /// plain numbers give zero, `Option`s give `None`.
    pub async fn sum<T: Summable>(
        &self,
        query: Query<E>,
        property: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<T> {
        let total = self.locked(cancel, self.backend.sum(&query, property)).await?;
        debug!("Sum of {}.{} = {:?}", E::schema().entity_type(), property, total);
        T::from_total(property, total)
    }

    // ── Mutations ────────────────────────────────────────────────

    pub async fn add(&mut self, mut entity: E, cancel: &CancellationToken) -> RepositoryResult<OperationResult<E>> {
        let services = Arc::clone(&self.services);
        cancellable(cancel, services.access.check(&erase(&entity))).await?;

        if !services.filters.before_validate(&mut entity, true).await? {
            debug!("Add of {} vetoed before validation", entity.node_key());
            return Ok(OperationResult::failed(entity, vec![ValidationFailure::vetoed("before_validate")], Vec::new()));
        }

        let ctx = ValidationContext {
            is_new: true,
            changes: &[],
        };
        let errors = services.validators.validate(&entity, ctx).await?;
        if !errors.is_empty() {
            debug!("Add of {} failed validation: {} error(s)", entity.node_key(), errors.len());
            return Ok(OperationResult::failed(entity, errors, Vec::new()));
        }

        if !services.filters.before_save(&mut entity, true).await? {
            debug!("Add of {} vetoed before save", entity.node_key());
            return Ok(OperationResult::failed(entity, vec![ValidationFailure::vetoed("before_save")], Vec::new()));
        }

        if entity.id().is_unset() {
            if let Some(id) = E::Id::generate() {
                entity.set_id(id);
            }
        }
        let assigned = self.locked(cancel, self.backend.add(&entity)).await?;
        assigned.write_back(&mut entity)?;

        self.finish(RepositoryRecord::new(entity, true, Vec::new()), cancel)
            .await
    }

    /// Updates an entity loaded through this repository. The snapshot taken
    /// at load time is the baseline.
    pub async fn update(&mut self, entity: E, cancel: &CancellationToken) -> RepositoryResult<OperationResult<E>> {
        self.update_external(entity, None, cancel).await
    }

    /// Updates a disconnected entity.
    ///
    /// The baseline is `base` (what the caller originally loaded) when
    /// given, else this repository's snapshot, else the currently persisted
    /// state. With no baseline at all every non-null property is reported
    /// as `Added` and the entity is stored as new.
    pub async fn update_external(
        &mut self,
        mut entity: E,
        base: Option<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<OperationResult<E>> {
        let services = Arc::clone(&self.services);
        cancellable(cancel, services.access.check(&erase(&entity))).await?;

        if !services.filters.before_validate(&mut entity, false).await? {
            debug!("Update of {} vetoed before validation", entity.node_key());
            return Ok(OperationResult::failed(entity, vec![ValidationFailure::vetoed("before_validate")], Vec::new()));
        }

        let baseline = match base {
            Some(base) => Some(base),
            None => match self.snapshots.get(&entity.id()) {
                Some(snapshot) => Some(snapshot.clone()),
                None => {
                    let id = entity.id();
                    self.locked(cancel, self.backend.get_persisted(&id)).await?
                }
            },
        };

        let changes = self.diff(baseline.as_ref(), &entity);
        if changes.is_empty() {
            debug!("No changes for {}, skipping save", entity.node_key());
            return Ok(OperationResult::success(entity, changes));
        }
        if services.config.log_changes {
            for change in &changes {
                debug!(
                    "{} {}: {:?} {} -> {}",
                    entity.node_key(),
                    change.name,
                    change.change_type,
                    change.original_value,
                    change.current_value
                );
            }
        }

        let is_new = baseline.is_none();
        let ctx = ValidationContext {
            is_new,
            changes: &changes,
        };
        let errors = services.validators.validate(&entity, ctx).await?;
        if !errors.is_empty() {
            debug!("Update of {} failed validation: {} error(s)", entity.node_key(), errors.len());
            return Ok(OperationResult::failed(entity, errors, changes));
        }

        if !services.filters.before_save(&mut entity, is_new).await? {
            debug!("Update of {} vetoed before save", entity.node_key());
            return Ok(OperationResult::failed(entity, vec![ValidationFailure::vetoed("before_save")], changes));
        }

        let assigned = self
            .locked(cancel, self.backend.update(&entity, baseline.as_ref()))
            .await?;
        assigned.write_back(&mut entity)?;

        self.finish(RepositoryRecord::new(entity, is_new, changes), cancel)
            .await
    }

    /// Deletes an entity. Returns `false` when it is not persisted or a
    /// filter cancelled the delete.
    pub async fn delete(&mut self, entity: &E, cancel: &CancellationToken) -> RepositoryResult<bool> {
        let services = Arc::clone(&self.services);
        cancellable(cancel, services.access.check(&erase(entity))).await?;

        let id = entity.id();
        if self.locked(cancel, self.backend.get_persisted(&id)).await?.is_none() {
            debug!("Delete of {} skipped: not found", entity.node_key());
            return Ok(false);
        }

        if !services.filters.before_delete(entity).await? {
            debug!("Delete of {} vetoed", entity.node_key());
            return Ok(false);
        }

        self.locked(cancel, self.backend.delete(entity)).await?;

        if let Some(batch) = self.batch.as_mut() {
            batch.push(Staged::Deleted(id));
            return Ok(true);
        }
        self.save_now(cancel).await?;
        self.snapshots.remove(&id);
        Ok(true)
    }

    /// Loads and deletes by id. Returns `false` when not found.
    pub async fn delete_by_id(&mut self, id: &E::Id, cancel: &CancellationToken) -> RepositoryResult<bool> {
        match self.get_by_id(id, cancel).await? {
            Some(entity) => self.delete(&entity, cancel).await,
            None => Ok(false),
        }
    }

    /// Saves immediately, or stages the record when a batch is open.
    async fn finish(
        &mut self,
        record: RepositoryRecord<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<OperationResult<E>> {
        if let Some(batch) = self.batch.as_mut() {
            let result = OperationResult::success(record.item.clone(), record.changes.clone());
            batch.push(Staged::Saved(record));
            return Ok(result);
        }

        self.save_now(cancel).await?;
        self.services.filters.after_save(record.erased()).await?;
        self.snapshots.insert(&record.item);
        Ok(OperationResult::success(record.item, record.changes))
    }

    // ── Changes ──────────────────────────────────────────────────

    fn diff(&self, baseline: Option<&E>, entity: &E) -> Vec<PropertyChange> {
        match baseline {
            Some(baseline) => self.comparer.changes(baseline, entity),
            None => self.comparer.changes(&Blank(entity.entity_type()), entity),
        }
    }

    /// Changes of `entity` against its snapshot, or against the persisted
    /// state when it was not loaded through this repository.
    pub async fn get_changes(&self, entity: &E, cancel: &CancellationToken) -> RepositoryResult<Vec<PropertyChange>> {
        if let Some(snapshot) = self.snapshots.get(&entity.id()) {
            return Ok(self.diff(Some(snapshot), entity));
        }
        let id = entity.id();
        let persisted = self.locked(cancel, self.backend.get_persisted(&id)).await?;
        Ok(self.diff(persisted.as_ref(), entity))
    }

    pub async fn has_changes(&self, entity: &E, cancel: &CancellationToken) -> RepositoryResult<bool> {
        Ok(!self.get_changes(entity, cancel).await?.is_empty())
    }

    // ── Batches ──────────────────────────────────────────────────

    /// Opens a batch. Returns `false` if one is already open.
    pub fn begin_batch(&mut self) -> bool {
        if self.batch.is_some() {
            return false;
        }
        self.batch = Some(Vec::new());
        true
    }

    pub fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Saves the batch with a single backend save, then runs `after_save`
    /// for every record in call order. Returns `false` when no batch is
    /// open.
    pub async fn commit_batch(&mut self, cancel: &CancellationToken) -> RepositoryResult<bool> {
        let Some(staged) = self.batch.take() else {
            return Ok(false);
        };
        if staged.is_empty() {
            return Ok(true);
        }

        self.save_now(cancel).await?;
        info!("Committed batch of {} {} operation(s)", staged.len(), E::schema().entity_type());

        let services = Arc::clone(&self.services);
        for item in staged {
            match item {
                Staged::Saved(record) => {
                    services.filters.after_save(record.erased()).await?;
                    self.snapshots.insert(&record.item);
                }
                Staged::Deleted(id) => {
                    self.snapshots.remove(&id);
                }
            }
        }
        Ok(true)
    }

    /// Drops the batch and everything it staged. Returns `false` when no
    /// batch is open.
    pub async fn rollback_batch(&mut self, cancel: &CancellationToken) -> RepositoryResult<bool> {
        let Some(staged) = self.batch.take() else {
            return Ok(false);
        };
        let _permit = self.lock.acquire(self.timeout(), cancel).await?;
        self.backend.discard().await;
        debug!("Rolled back batch of {} operation(s)", staged.len());
        Ok(true)
    }

    // ── Transactions ─────────────────────────────────────────────

    /// Begins a backend transaction. Returns `true` when one is already
    /// active; backend failures are logged and reported as `false`.
    pub async fn begin_transaction(&self, cancel: &CancellationToken) -> RepositoryResult<bool> {
        if self.backend.in_transaction() {
            return Ok(true);
        }
        soften("begin", self.locked(cancel, self.backend.begin()).await)
    }

    /// Commits the active transaction. Returns `false` when none is active
    /// or the backend failed.
    pub async fn commit_transaction(&self, cancel: &CancellationToken) -> RepositoryResult<bool> {
        if !self.backend.in_transaction() {
            return Ok(false);
        }
        soften("commit", self.locked(cancel, self.backend.commit()).await)
    }

    /// Rolls back the active transaction. Returns `false` when none is
    /// active or the backend failed.
    pub async fn rollback_transaction(&self, cancel: &CancellationToken) -> RepositoryResult<bool> {
        if !self.backend.in_transaction() {
            return Ok(false);
        }
        soften("rollback", self.locked(cancel, self.backend.rollback()).await)
    }
}

/// Transaction boundaries report backend failures as `false`. Lock timeouts
/// and cancellation still propagate.
fn soften(action: &str, outcome: RepositoryResult<()>) -> RepositoryResult<bool> {
    match outcome {
        Ok(()) => {
            info!("Transaction {} succeeded", action);
            Ok(true)
        }
        Err(e @ (RepositoryError::Cancelled | RepositoryError::LockTimeout(_))) => Err(e),
        Err(e) => {
            warn!("Transaction {} failed: {}", action, e);
            Ok(false)
        }
    }
}

fn erase<E: Entity>(entity: &E) -> [&dyn DynEntity; 1] {
    [entity]
}

/// Stand-in baseline for an entity with no persisted counterpart.
struct Blank(&'static str);

impl GraphNode for Blank {
    fn entity_type(&self) -> &'static str {
        self.0
    }

    fn key(&self) -> KeyValue {
        KeyValue::Int(0)
    }

    fn scalars(&self) -> Properties {
        Properties::new()
    }
}
