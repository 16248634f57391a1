use crate::{RepositoryError, RepositoryResult, ValidationFailure};
use unitwork_model::PropertyChange;

/// Outcome of an add or update: the entity, any validation failures and
/// the changes that were (or would have been) persisted.
#[derive(Debug, Clone)]
pub struct OperationResult<E> {
    pub entity: E,
    pub errors: Vec<ValidationFailure>,
    pub changes: Vec<PropertyChange>,
}

impl<E> OperationResult<E> {
    pub fn success(entity: E, changes: Vec<PropertyChange>) -> Self {
        Self {
            entity,
            errors: Vec::new(),
            changes,
        }
    }

    pub fn failed(entity: E, errors: Vec<ValidationFailure>, changes: Vec<PropertyChange>) -> Self {
        Self {
            entity,
            errors,
            changes,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts validation failures into [`RepositoryError::Validation`].
    pub fn into_result(self) -> RepositoryResult<E> {
        if self.errors.is_empty() {
            Ok(self.entity)
        } else {
            Err(RepositoryError::Validation(self.errors))
        }
    }
}
