use crate::RepositoryResult;
use async_trait::async_trait;
use unitwork_model::DynEntity;

/// Decides whether the current caller may see or change entities.
///
/// Implementations reject with [`crate::RepositoryError::access_denied`]
/// naming the offending entity.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn check(&self, entities: &[&dyn DynEntity]) -> RepositoryResult<()>;
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessChecker for AllowAll {
    async fn check(&self, _entities: &[&dyn DynEntity]) -> RepositoryResult<()> {
        Ok(())
    }
}
