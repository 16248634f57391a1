use crate::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use unitwork_model::Comparer;

/// Repository configuration.
///
/// ```toml
/// lock_timeout_ms = 5000
/// max_differences = 100
/// log_changes = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Maximum wait for the unit-of-work lock (ms).
    pub lock_timeout_ms: u64,
    /// Cap on differences reported per comparison. Unlimited when unset.
    pub max_differences: Option<usize>,
    /// Log every computed change set at debug level.
    pub log_changes: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 30_000,
            max_differences: None,
            log_changes: false,
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(s: &str) -> RepositoryResult<Self> {
        toml::from_str(s).map_err(|e| RepositoryError::Config(e.to_string()))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// The comparer used for change detection.
    pub fn comparer(&self) -> Comparer {
        match self.max_differences {
            Some(max) => Comparer::new().with_max_differences(max),
            None => Comparer::new(),
        }
    }
}
