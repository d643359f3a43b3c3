use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use tessera_state::error::StateError;
use tessera_state::key::{KeyKind, StateKey};
use tessera_state::store::{CasResult, StateStore, Versioned};

use crate::config::RedisConfig;
use crate::key_render::render_key;
use crate::scripts;

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool and Lua scripts for atomicity.
/// Every record lives in a Redis hash with fields `v` (value) and `ver`
/// (version) under a `:h`-suffixed key; counters share that layout, with
/// `increment` bumping both fields in one script.
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
    connection_timeout: Duration,
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
            connection_timeout: config.connection_timeout,
        })
    }

    /// Build the full Redis key for a versioned hash entry.
    fn hash_key(&self, key: &StateKey) -> String {
        format!("{}:h", render_key(&self.prefix, key))
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool.get().await.map_err(|e| match e {
            deadpool_redis::PoolError::Timeout(_) => StateError::Timeout(self.connection_timeout),
            other => StateError::Connection(other.to_string()),
        })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        let hash_key = self.hash_key(key);
        let mut conn = self.conn().await?;

        let (value, version): (Option<String>, Option<u64>) = conn
            .hget(&hash_key, &["v", "ver"])
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(value.map(|value| Versioned {
            value,
            version: version.unwrap_or(1),
        }))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let hash_key = self.hash_key(key);
        let ttl_ms = ttl.map_or(0i64, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::SET_VERSIONED);
        let _new_ver: u64 = script
            .key(&hash_key)
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let hash_key = self.hash_key(key);
        let mut conn = self.conn().await?;

        let deleted: i64 = conn
            .del(&hash_key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(deleted > 0)
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        let hash_key = self.hash_key(key);
        let ttl_ms = ttl.map_or(0i64, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::INCREMENT_VERSIONED);
        let new_val: i64 = script
            .key(&hash_key)
            .arg(delta)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(new_val)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let hash_key = self.hash_key(key);
        let ttl_ms = ttl.map_or(0i64, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::COMPARE_AND_SWAP);
        let result: Vec<redis::Value> = script
            .key(&hash_key)
            .arg(expected_version)
            .arg(new_value)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        // Parse the Lua return value.
        // Success: [1, new_version]
        // Conflict: [0, current_version, current_value | false]
        let status = match result.first() {
            Some(redis::Value::Int(n)) => *n,
            _ => return Err(StateError::Backend("unexpected CAS script response".into())),
        };

        if status == 1 {
            Ok(CasResult::Ok)
        } else {
            let current_version = match result.get(1) {
                Some(redis::Value::Int(n)) => u64::try_from(*n).unwrap_or(0),
                _ => 0,
            };
            let current_value = match result.get(2) {
                Some(redis::Value::BulkString(bytes)) => String::from_utf8(bytes.clone()).ok(),
                _ => None,
            };

            Ok(CasResult::Conflict {
                current_value,
                current_version,
            })
        }
    }

    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let pattern = match prefix {
            Some(p) => format!("{}:{}:{}:{}:{}*", self.prefix, namespace, tenant, kind, p),
            None => format!("{}:{}:{}:{}:*", self.prefix, namespace, tenant, kind),
        };
        let strip = format!("{}:", self.prefix);

        let mut conn = self.conn().await?;
        let mut results = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| StateError::Backend(e.to_string()))?;

            for key in keys {
                // Every record of this store lives under a `:h`-suffixed
                // hash; anything else matching the pattern is foreign.
                let Some(unsuffixed) = key.strip_suffix(":h") else {
                    continue;
                };
                let value: Option<String> = conn
                    .hget(&key, "v")
                    .await
                    .map_err(|e| StateError::Backend(e.to_string()))?;
                let Some(value) = value else {
                    continue;
                };

                // Strip the backend prefix to return a canonical key.
                let clean_key = unsuffixed.strip_prefix(&strip).unwrap_or(unsuffixed).to_string();

                results.push((clean_key, value));
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(results)
    }
}
