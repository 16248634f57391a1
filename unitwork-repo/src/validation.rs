use crate::{RepositoryResult, ValidationFailure};
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use unitwork_model::{DynEntity, Entity, PropertyChange};

/// What is being validated: a new entity, or an update with its changes.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub is_new: bool,
    pub changes: &'a [PropertyChange],
}

impl ValidationContext<'_> {
    /// Returns true when `name` changed in this update (always true for new
    /// entities).
    pub fn changed(&self, name: &str) -> bool {
        self.is_new || self.changes.iter().any(|c| c.name == name)
    }
}

/// Polymorphic validator.
#[async_trait]
pub trait Validator: Send + Sync {
    fn can_process(&self, entity_type: &str) -> bool;

    async fn validate(
        &self,
        entity: &dyn DynEntity,
        ctx: ValidationContext<'_>,
    ) -> RepositoryResult<Vec<ValidationFailure>>;
}

/// Typed validator for one entity type.
#[async_trait]
pub trait EntityValidator<E: Entity>: Send + Sync {
    async fn validate(&self, entity: &E, ctx: ValidationContext<'_>) -> RepositoryResult<Vec<ValidationFailure>>;
}

/// Adapts an [`EntityValidator<E>`] to the polymorphic registry.
pub struct TypedValidator<E, V> {
    inner: V,
    _entity: PhantomData<fn() -> E>,
}

impl<E, V> TypedValidator<E, V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Entity, V: EntityValidator<E>> Validator for TypedValidator<E, V> {
    fn can_process(&self, entity_type: &str) -> bool {
        E::schema().entity_type() == entity_type
    }

    async fn validate(
        &self,
        entity: &dyn DynEntity,
        ctx: ValidationContext<'_>,
    ) -> RepositoryResult<Vec<ValidationFailure>> {
        match entity.downcast_ref::<E>() {
            Some(e) => self.inner.validate(e, ctx).await,
            None => Ok(Vec::new()),
        }
    }
}

type ValidatorList = Arc<[Arc<dyn Validator>]>;

/// Registry of validators. Every applicable validator runs and their
/// failures are concatenated.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn Validator>>,
    by_type: Mutex<HashMap<String, ValidatorList>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn typed<E: Entity, V: EntityValidator<E> + 'static>(self, validator: V) -> Self {
        self.register(TypedValidator::<E, V>::new(validator))
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    fn for_type(&self, entity_type: &str) -> ValidatorList {
        let mut cache = self.by_type.lock().unwrap();
        cache
            .entry(entity_type.to_string())
            .or_insert_with(|| {
                self.validators
                    .iter()
                    .filter(|v| v.can_process(entity_type))
                    .cloned()
                    .collect()
            })
            .clone()
    }

    pub async fn validate(
        &self,
        entity: &dyn DynEntity,
        ctx: ValidationContext<'_>,
    ) -> RepositoryResult<Vec<ValidationFailure>> {
        let mut failures = Vec::new();
        for validator in self.for_type(entity.entity_type()).iter() {
            failures.extend(validator.validate(entity, ctx).await?);
        }
        Ok(failures)
    }
}
