//! Caller-side retry loop for compare-and-swap updates.
//!
//! Stores never retry `update` themselves. Workers that need a
//! read-modify-write cycle use [`update_with`], which re-reads the current
//! value and recomputes after every conflict.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StateError};
use crate::namespace::SEPARATOR;
use crate::storage::StateStore;

/// Bounds for [`update_with`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff in milliseconds, doubled after each conflict. 0 retries immediately.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 10,
        }
    }
}

impl RetryConfig {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Read `key`, compute its replacement and write it back with
/// compare-and-swap, retrying on conflict.
///
/// Returns the value that was written. Errors other than a conflict (including
/// `NotFound` for an absent key) are returned immediately. `RetriesExhausted`
/// carries the physical key, like every other per-key error.
pub async fn update_with<S, F>(
    store: &S,
    key: &str,
    retry: &RetryConfig,
    mut compute: F,
) -> Result<String>
where
    S: StateStore + ?Sized,
    F: FnMut(&str) -> String + Send,
{
    let max_attempts = retry.max_retries.saturating_add(1);

    for attempt in 1..=max_attempts {
        let current = store.get(key).await?;
        let next = compute(&current);

        match store.update(key, &current, &next).await {
            Ok(()) => {
                debug!(key, attempt, "update applied");
                return Ok(next);
            }
            Err(err) if err.is_conflict() => {
                warn!(key, attempt, max = max_attempts, "Update conflicted");
                if attempt < max_attempts && retry.backoff_ms > 0 {
                    tokio::time::sleep(retry.delay(attempt)).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    let physical_key = match store.namespace() {
        Some(namespace) => format!("{namespace}{SEPARATOR}{key}"),
        None => key.to_string(),
    };
    Err(StateError::RetriesExhausted {
        key: physical_key,
        attempts: max_attempts,
    })
}
