//! Repository capabilities over a [`TrackedSession`].

use crate::reconciler::AttachMode;
use crate::session::TrackedSession;
use crate::store::RowStore;
use crate::Row;
use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::{info, warn};
use unitwork_model::{Entity, GraphNode, KeyAssignments};
use unitwork_query::{sum_values, IncludeTree, Query, QueryError, Total};
use unitwork_repo::{Aggregator, Loader, Mutator, RepositoryResult, SaveSummary, Transactional, UnitLock};
use unitwork_types::{Identity, NodeKey};

/// Backend for entity type `E`. Backends for different entity types built
/// from one session share its tracker, so a single save persists all of
/// them.
pub struct TrackedBackend<E, S> {
    session: TrackedSession<S>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S> Clone for TrackedBackend<E, S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, S: RowStore> TrackedBackend<E, S> {
    pub fn new(session: TrackedSession<S>) -> Self {
        session.register(E::schema());
        Self {
            session,
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &TrackedSession<S> {
        &self.session
    }
}

#[async_trait]
impl<E: Entity, S: RowStore + 'static> Loader<E> for TrackedBackend<E, S> {
    async fn get(&self, query: &Query<E>) -> RepositoryResult<Option<E>> {
        let mut spec = query.spec().clone();
        spec.limit = Some(spec.limit.map_or(1, |limit| limit.min(1)));
        let includes = IncludeTree::from_paths(&spec.includes);
        let rows = self.session.store().select(E::schema(), &spec).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(self.session.materialize(row, &includes).await?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self, query: &Query<E>) -> RepositoryResult<Vec<E>> {
        let spec = query.spec();
        let includes = IncludeTree::from_paths(&spec.includes);
        let rows = self.session.store().select(E::schema(), spec).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(self.session.materialize(row, &includes).await?);
        }
        Ok(entities)
    }

    async fn get_persisted(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        let node = NodeKey::new(E::schema().entity_type(), id.to_key());
        match self.session.store().fetch(&node).await? {
            Some(scalars) => {
                let row = Row { node, scalars };
                Ok(Some(self.session.materialize(row, &IncludeTree::default()).await?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<E: Entity, S: RowStore + 'static> Aggregator<E> for TrackedBackend<E, S> {
    async fn count(&self, query: &Query<E>) -> RepositoryResult<u64> {
        Ok(self.session.store().count(E::schema(), query.spec()).await?)
    }

    async fn sum(&self, query: &Query<E>, property: &str) -> RepositoryResult<Option<Total>> {
        let descriptor = E::schema()
            .resolve(property)
            .ok_or_else(|| QueryError::UnknownProperty(property.to_string()))?;
        let scalar_type = descriptor
            .scalar_type()
            .ok_or_else(|| QueryError::NotNumeric(descriptor.name.to_string()))?;
        let values = self
            .session
            .store()
            .scalar_values(E::schema(), query.spec(), descriptor.name)
            .await?;
        Ok(sum_values(descriptor.name, scalar_type, values.iter())?)
    }
}

#[async_trait]
impl<E: Entity, S: RowStore + 'static> Mutator<E> for TrackedBackend<E, S> {
    async fn add(&self, entity: &E) -> RepositoryResult<KeyAssignments> {
        let report = self.session.attach(entity, None, AttachMode::Add).await?;
        Ok(report.keys)
    }

    async fn update(&self, entity: &E, base: Option<&E>) -> RepositoryResult<KeyAssignments> {
        let base = base.map(|b| b as &dyn GraphNode);
        let report = self.session.attach(entity, base, AttachMode::Update).await?;
        Ok(report.keys)
    }

    async fn delete(&self, entity: &E) -> RepositoryResult<()> {
        self.session.mark_deleted(entity.node_key()).await;
        Ok(())
    }

    async fn save(&self) -> RepositoryResult<SaveSummary> {
        Ok(self.session.save().await?)
    }

    async fn discard(&self) {
        self.session.discard().await;
    }
}

#[async_trait]
impl<E: Entity, S: RowStore + 'static> Transactional for TrackedBackend<E, S> {
    async fn begin(&self) -> RepositoryResult<()> {
        self.session.store().begin().await?;
        info!("Transaction started");
        Ok(())
    }

    async fn commit(&self) -> RepositoryResult<()> {
        self.session.store().commit().await?;
        info!("Transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> RepositoryResult<()> {
        self.session.discard().await;
        if let Err(e) = self.session.store().rollback().await {
            warn!("Rollback failed: {}", e);
            return Err(e.into());
        }
        info!("Transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.session.store().in_transaction()
    }

    fn unit_lock(&self) -> UnitLock {
        self.session.unit_lock()
    }
}
