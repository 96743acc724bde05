use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, StateError};
use crate::namespace::{DEFAULT_PREFIX, Scope};
use crate::storage::{CleanupReport, StateStore};

type Keyspace = BTreeMap<String, String>;

/// In-memory state store.
///
/// Clones share one keyspace but keep their own namespace, mirroring several
/// handles connected to the same backend. Each operation runs under a single
/// lock, so `update` and `incr` are atomic with respect to each other.
#[derive(Clone)]
pub struct MemoryStateStore {
    data: Arc<Mutex<Keyspace>>,
    prefix: String,
    scope: Scope,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            prefix: DEFAULT_PREFIX.to_string(),
            scope: Scope::Unset,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Number of physical keys across all namespaces.
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn physical_key(&self, key: &str) -> Result<String> {
        self.scope.namespace()?.key(key)
    }

    fn lock(&self, key: &str) -> Result<MutexGuard<'_, Keyspace>> {
        self.data
            .lock()
            .map_err(|e| StateError::store(key, format!("memory keyspace poisoned: {}", e)))
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn configure(&mut self, flow_name: &str, request_id: &str) {
        self.scope = Scope::configure(&self.prefix, flow_name, request_id);
    }

    fn namespace(&self) -> Option<&str> {
        self.scope.as_str()
    }

    async fn get(&self, key: &str) -> Result<String> {
        let key = self.physical_key(key)?;
        let data = self.lock(&key)?;
        data.get(&key)
            .cloned()
            .ok_or(StateError::NotFound { key })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = self.physical_key(key)?;
        debug!(key = %key, "set");
        self.lock(&key)?.insert(key, value.to_string());
        Ok(())
    }

    async fn update(&self, key: &str, old_value: &str, new_value: &str) -> Result<()> {
        let key = self.physical_key(key)?;
        let mut data = self.lock(&key)?;
        match data.get_mut(&key) {
            Some(current) if current == old_value => {
                *current = new_value.to_string();
                debug!(key = %key, "compare-and-swap applied");
                Ok(())
            }
            _ => Err(StateError::CasConflict { key }),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let key = self.physical_key(key)?;
        let mut data = self.lock(&key)?;
        let current = match data.get(&key) {
            Some(raw) => parse_integer(raw)
                .ok_or_else(|| StateError::store(&key, "value is not an integer or out of range"))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StateError::store(&key, "increment or decrement would overflow"))?;
        data.insert(key, next.to_string());
        Ok(next)
    }

    async fn cleanup(&self) -> Result<()> {
        let namespace = self.scope.namespace()?;
        let mut data = self.lock(namespace.as_str())?;
        let mut report = CleanupReport::default();

        data.retain(|key, _| {
            if namespace.contains(key) {
                report.record_deleted();
                false
            } else {
                true
            }
        });

        report.finish(namespace.as_str())
    }
}

/// Parse a stored value the way Redis does for `INCRBY`: optional `-`, no
/// `+`, no leading zeros, no surrounding whitespace.
fn parse_integer(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let canonical = match digits.as_bytes() {
        [] => false,
        [b'0'] => digits.len() == raw.len(),
        [first, rest @ ..] => {
            (b'1'..=b'9').contains(first) && rest.iter().all(u8::is_ascii_digit)
        }
    };
    if canonical { raw.parse().ok() } else { None }
}
