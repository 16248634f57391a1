use crate::{AccessChecker, AllowAll, FiltersManager, RepositoryConfig, ValidatorRegistry};
use std::sync::Arc;

/// Collaborators shared by every repository of an application: filters,
/// validators, the access checker and configuration. Built once and
/// shared through an `Arc`.
pub struct Services {
    pub filters: FiltersManager,
    pub validators: ValidatorRegistry,
    pub access: Arc<dyn AccessChecker>,
    pub config: RepositoryConfig,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            filters: FiltersManager::default(),
            validators: ValidatorRegistry::default(),
            access: Arc::new(AllowAll),
            config: RepositoryConfig::default(),
        }
    }
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: FiltersManager) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_access(mut self, access: impl AccessChecker + 'static) -> Self {
        self.access = Arc::new(access);
        self
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
