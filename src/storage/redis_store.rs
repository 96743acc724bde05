use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use tracing::{debug, info};

use crate::error::{BoxError, Result, StateError};
use crate::namespace::{DEFAULT_PREFIX, Namespace, Scope};
use crate::storage::{CleanupReport, StateStore};

/// Set the key only if it still holds the expected value. Returns 0 when the
/// write happened, 1 otherwise. A missing key reads as `false` in Lua and never
/// equals a string argument.
const CAS_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 0
end
return 1
";

const SCAN_BATCH: usize = 100;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed state store.
///
/// Clones share the connection manager and the loaded CAS script. The
/// connection manager multiplexes commands and reconnects on its own, so one
/// store can serve many concurrent workers.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
    cas_script: Arc<Script>,
    prefix: String,
    scope: Scope,
}

impl RedisStateStore {
    /// Connect to `address` and verify the server answers `PING`.
    ///
    /// Accepts `host:port` or a full `redis://` / `rediss://` URL.
    pub async fn connect(address: &str) -> Result<Self> {
        let url = normalize_address(address);
        let client = redis::Client::open(url.as_str()).map_err(|e| connection_error(address, e))?;

        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|e| connection_error(address, e))?
            .map_err(|e| connection_error(address, e))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| connection_error(address, e))?;

        info!(address = %address, reply = %pong, "Connected to state backend");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already connected manager. No connectivity check is made.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            cas_script: Arc::new(Script::new(CAS_SCRIPT)),
            prefix: DEFAULT_PREFIX.to_string(),
            scope: Scope::Unset,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    fn configured(&self) -> Result<&Namespace> {
        self.scope.namespace()
    }

    fn physical_key(&self, key: &str) -> Result<String> {
        self.configured()?.key(key)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    fn configure(&mut self, flow_name: &str, request_id: &str) {
        self.scope = Scope::configure(&self.prefix, flow_name, request_id);
    }

    fn namespace(&self) -> Option<&str> {
        self.scope.as_str()
    }

    async fn init(&self) -> Result<()> {
        debug!(namespace = ?self.namespace(), "init");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String> {
        let key = self.physical_key(key)?;
        let mut conn = self.conn.clone();

        let value: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::store(&key, e))?;

        value.ok_or(StateError::NotFound { key })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = self.physical_key(key)?;
        let mut conn = self.conn.clone();

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::store(&key, e))?;

        debug!(key = %key, "set");
        Ok(())
    }

    async fn update(&self, key: &str, old_value: &str, new_value: &str) -> Result<()> {
        let key = self.physical_key(key)?;
        let mut conn = self.conn.clone();

        let outcome: i64 = self
            .cas_script
            .key(&key)
            .arg(old_value)
            .arg(new_value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::store(&key, e))?;

        match outcome {
            0 => {
                debug!(key = %key, "compare-and-swap applied");
                Ok(())
            }
            1 => Err(StateError::CasConflict { key }),
            other => Err(StateError::store(
                &key,
                format!("unexpected compare-and-swap reply {}", other),
            )),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let key = self.physical_key(key)?;
        let mut conn = self.conn.clone();

        redis::cmd("INCRBY")
            .arg(&key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::store(&key, e))
    }

    async fn cleanup(&self) -> Result<()> {
        let namespace = self.configured()?;
        let pattern = namespace.scan_pattern();
        let mut conn = self.conn.clone();
        let mut report = CleanupReport::default();
        let mut cursor: u64 = 0;

        loop {
            // Keys are read as raw bytes so a non-UTF-8 key cannot fail the page.
            let page: RedisResult<(u64, Vec<Vec<u8>>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;

            // A failed SCAN loses the cursor, so there is nothing left to walk.
            let (next, keys) = match page {
                Ok(page) => page,
                Err(e) => {
                    report.record_failure(StateError::store(&pattern, e));
                    break;
                }
            };

            for key in keys {
                let deleted: RedisResult<i64> =
                    redis::cmd("DEL").arg(&key).query_async(&mut conn).await;
                match deleted {
                    Ok(_) => report.record_deleted(),
                    Err(e) => report
                        .record_failure(StateError::store(&String::from_utf8_lossy(&key), e)),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        report.finish(namespace.as_str())
    }
}

fn connection_error(address: &str, source: impl Into<BoxError>) -> StateError {
    StateError::Connection {
        address: address.to_string(),
        source: source.into(),
    }
}

fn normalize_address(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}
