//! Lifecycle filters.
//!
//! A filter declares which entity types it processes and hooks into loads,
//! validation, saves and deletes. The [`FiltersManager`] runs every
//! applicable filter in registration order. For the vetoing hooks the
//! result of the **last** applicable filter is the outcome: a later filter
//! returning `true` overrides an earlier veto.

use crate::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::debug;
use unitwork_model::{DynEntity, Entity, RecordRef};

/// Polymorphic lifecycle hook.
#[async_trait]
pub trait RepositoryFilter: Send + Sync {
    /// Whether this filter handles the given entity type.
    fn can_process(&self, entity_type: &str) -> bool;

    /// Runs after `new_entity` and after every load.
    async fn after_load(&self, _entity: &mut dyn DynEntity) -> RepositoryResult<()> {
        Ok(())
    }

    /// Runs before validation. Returning `false` vetoes the operation.
    async fn before_validate(&self, _entity: &mut dyn DynEntity, _is_new: bool) -> RepositoryResult<bool> {
        Ok(true)
    }

    /// Runs after successful validation. Returning `false` vetoes persistence.
    async fn before_save(&self, _entity: &mut dyn DynEntity, _is_new: bool) -> RepositoryResult<bool> {
        Ok(true)
    }

    /// Runs after the backend committed.
    async fn after_save(&self, _record: RecordRef<'_, dyn DynEntity>) -> RepositoryResult<()> {
        Ok(())
    }

    /// Runs before a delete is staged. Returning `false` cancels the delete.
    async fn before_delete(&self, _entity: &dyn DynEntity) -> RepositoryResult<bool> {
        Ok(true)
    }
}

/// Typed form of [`RepositoryFilter`] for a single entity type. Register it
/// with [`FiltersManagerBuilder::typed`].
#[async_trait]
pub trait EntityFilter<E: Entity>: Send + Sync {
    async fn after_load(&self, _entity: &mut E) -> RepositoryResult<()> {
        Ok(())
    }

    async fn before_validate(&self, _entity: &mut E, _is_new: bool) -> RepositoryResult<bool> {
        Ok(true)
    }

    async fn before_save(&self, _entity: &mut E, _is_new: bool) -> RepositoryResult<bool> {
        Ok(true)
    }

    async fn after_save(&self, _record: RecordRef<'_, E>) -> RepositoryResult<()> {
        Ok(())
    }

    async fn before_delete(&self, _entity: &E) -> RepositoryResult<bool> {
        Ok(true)
    }
}

/// Adapts an [`EntityFilter<E>`] to the polymorphic registry.
pub struct TypedFilter<E, F> {
    inner: F,
    _entity: PhantomData<fn() -> E>,
}

impl<E, F> TypedFilter<E, F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Entity, F: EntityFilter<E>> RepositoryFilter for TypedFilter<E, F> {
    fn can_process(&self, entity_type: &str) -> bool {
        E::schema().entity_type() == entity_type
    }

    async fn after_load(&self, entity: &mut dyn DynEntity) -> RepositoryResult<()> {
        match entity.downcast_mut::<E>() {
            Some(e) => self.inner.after_load(e).await,
            None => Ok(()),
        }
    }

    async fn before_validate(&self, entity: &mut dyn DynEntity, is_new: bool) -> RepositoryResult<bool> {
        match entity.downcast_mut::<E>() {
            Some(e) => self.inner.before_validate(e, is_new).await,
            None => Ok(true),
        }
    }

    async fn before_save(&self, entity: &mut dyn DynEntity, is_new: bool) -> RepositoryResult<bool> {
        match entity.downcast_mut::<E>() {
            Some(e) => self.inner.before_save(e, is_new).await,
            None => Ok(true),
        }
    }

    async fn after_save(&self, record: RecordRef<'_, dyn DynEntity>) -> RepositoryResult<()> {
        match record.item.downcast_ref::<E>() {
            Some(item) => {
                let typed = RecordRef {
                    item,
                    is_new: record.is_new,
                    changes: record.changes,
                };
                self.inner.after_save(typed).await
            }
            None => Ok(()),
        }
    }

    async fn before_delete(&self, entity: &dyn DynEntity) -> RepositoryResult<bool> {
        match entity.downcast_ref::<E>() {
            Some(e) => self.inner.before_delete(e).await,
            None => Ok(true),
        }
    }
}

type FilterList = Arc<[Arc<dyn RepositoryFilter>]>;

/// Ordered registry of filters, built once at startup.
#[derive(Default)]
pub struct FiltersManager {
    filters: Vec<Arc<dyn RepositoryFilter>>,
    /// Applicable filters per entity type, resolved on first use.
    by_type: Mutex<HashMap<String, FilterList>>,
}

/// Builder for [`FiltersManager`].
#[derive(Default)]
pub struct FiltersManagerBuilder {
    filters: Vec<Arc<dyn RepositoryFilter>>,
}

impl FiltersManagerBuilder {
    pub fn filter<F: RepositoryFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn shared(mut self, filter: Arc<dyn RepositoryFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn typed<E: Entity, F: EntityFilter<E> + 'static>(self, filter: F) -> Self {
        self.filter(TypedFilter::<E, F>::new(filter))
    }

    pub fn build(self) -> FiltersManager {
        FiltersManager {
            filters: self.filters,
            by_type: Mutex::new(HashMap::new()),
        }
    }
}

impl FiltersManager {
    pub fn builder() -> FiltersManagerBuilder {
        FiltersManagerBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filters applicable to `entity_type`, in registration order.
    pub fn for_type(&self, entity_type: &str) -> FilterList {
        let mut cache = self.by_type.lock().unwrap();
        if let Some(list) = cache.get(entity_type) {
            return Arc::clone(list);
        }
        let list: FilterList = self
            .filters
            .iter()
            .filter(|f| f.can_process(entity_type))
            .cloned()
            .collect();
        debug!("Resolved {} filter(s) for {}", list.len(), entity_type);
        cache.insert(entity_type.to_string(), Arc::clone(&list));
        list
    }

    pub async fn after_load(&self, entity: &mut dyn DynEntity) -> RepositoryResult<()> {
        for filter in self.for_type(entity.entity_type()).iter() {
            filter.after_load(entity).await?;
        }
        Ok(())
    }

    pub async fn before_validate(&self, entity: &mut dyn DynEntity, is_new: bool) -> RepositoryResult<bool> {
        let mut outcome = true;
        for filter in self.for_type(entity.entity_type()).iter() {
            outcome = filter.before_validate(entity, is_new).await?;
        }
        Ok(outcome)
    }

    pub async fn before_save(&self, entity: &mut dyn DynEntity, is_new: bool) -> RepositoryResult<bool> {
        let mut outcome = true;
        for filter in self.for_type(entity.entity_type()).iter() {
            outcome = filter.before_save(entity, is_new).await?;
        }
        Ok(outcome)
    }

    pub async fn after_save(&self, record: RecordRef<'_, dyn DynEntity>) -> RepositoryResult<()> {
        for filter in self.for_type(record.item.entity_type()).iter() {
            filter.after_save(record).await?;
        }
        Ok(())
    }

    pub async fn before_delete(&self, entity: &dyn DynEntity) -> RepositoryResult<bool> {
        let mut outcome = true;
        for filter in self.for_type(entity.entity_type()).iter() {
            outcome = filter.before_delete(entity).await?;
        }
        Ok(outcome)
    }
}
