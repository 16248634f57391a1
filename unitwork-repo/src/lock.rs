//! Single-slot lock serializing access to one unit of work's session.

use crate::{RepositoryError, RepositoryResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Exclusive lock over a backend session, shared by every repository that
/// works against that session.
#[derive(Debug, Clone)]
pub struct UnitLock {
    permits: Arc<Semaphore>,
}

/// Held while a backend call runs. Released on drop.
#[derive(Debug)]
pub struct UnitPermit {
    _permit: OwnedSemaphorePermit,
}

impl Default for UnitLock {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitLock {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Waits up to `timeout` for the lock. Cancellation wins over a pending
    /// acquire.
    pub async fn acquire(&self, timeout: Duration, cancel: &CancellationToken) -> RepositoryResult<UnitPermit> {
        let permits = Arc::clone(&self.permits);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RepositoryError::Cancelled),
            acquired = tokio::time::timeout(timeout, permits.acquire_owned()) => match acquired {
                Ok(Ok(permit)) => Ok(UnitPermit { _permit: permit }),
                Ok(Err(_)) => Err(RepositoryError::InvalidOperation("unit of work is closed".into())),
                Err(_) => Err(RepositoryError::LockTimeout(timeout)),
            },
        }
    }

    /// Returns true when nobody holds the lock.
    pub fn is_free(&self) -> bool {
        self.permits.available_permits() > 0
    }
}

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> RepositoryResult<T>
where
    F: std::future::Future<Output = RepositoryResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RepositoryError::Cancelled),
        out = fut => out,
    }
}
