pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Result, StateError};

/// Per-request key-value state shared by the workers of one workflow run.
///
/// A store is configured once with the flow name and request id, then used
/// concurrently by any number of workers. Implementations hold no in-process
/// locks across operations; atomicity of `update` and `incr` comes from the
/// backend.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Scope all following operations to one request. Performs no I/O.
    fn configure(&mut self, flow_name: &str, request_id: &str);

    /// Current namespace, or `None` before `configure`.
    fn namespace(&self) -> Option<&str>;

    /// Per-request setup hook. Called once per request.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Read a value. Fails with `NotFound` if the key is absent.
    async fn get(&self, key: &str) -> Result<String>;

    /// Create or overwrite a value, without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Atomically replace `old_value` with `new_value`.
    ///
    /// Fails with `CasConflict` when the stored value differs from
    /// `old_value`, including when the key does not exist. Never retries.
    async fn update(&self, key: &str, old_value: &str, new_value: &str) -> Result<()>;

    /// Atomically add `delta` to an integer value, starting from 0 when absent.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64>;

    /// Remove every key of the request. Best effort: keeps going past
    /// individual failures and reports them together.
    async fn cleanup(&self) -> Result<()>;
}

/// Tally of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failures: usize,
    last_error: Option<StateError>,
}

impl CleanupReport {
    pub fn record_deleted(&mut self) {
        self.deleted += 1;
    }

    pub fn record_failure(&mut self, err: StateError) {
        warn!(error = %err, "Cleanup step failed");
        self.failures += 1;
        self.last_error = Some(err);
    }

    /// Collapse the tally into the cleanup result.
    pub fn finish(self, namespace: &str) -> Result<()> {
        match self.last_error {
            None => {
                info!(namespace, deleted = self.deleted, "Request state cleaned up");
                Ok(())
            }
            Some(last) => Err(StateError::Cleanup {
                namespace: namespace.to_string(),
                failures: self.failures,
                last: Box::new(last),
            }),
        }
    }
}
