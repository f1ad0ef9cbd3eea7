//! Redis counter store using a Lua compare-and-swap script.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use quota_core::domain::{CounterKey, QuotaCounter, WindowKind};
use quota_core::ports::{CasOutcome, CounterStore, CounterStoreError, CounterWrite};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

/// Redis counter store configuration.
#[derive(Debug, Clone)]
pub struct RedisCounterStoreConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix for counter hashes
    pub key_prefix: String,
}

impl Default for RedisCounterStoreConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: "quota".to_string(),
        }
    }
}

impl RedisCounterStoreConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            key_prefix: std::env::var("QUOTA_KEY_PREFIX").unwrap_or_else(|_| "quota".to_string()),
        }
    }
}

/// Stale buckets are never read again; Redis drops them after this long.
fn bucket_ttl(kind: WindowKind) -> Duration {
    match kind {
        WindowKind::Minute => Duration::from_secs(120),
        WindowKind::Day => Duration::from_secs(48 * 3600),
    }
}

/// Redis-backed counter store.
///
/// Each bucket is a hash with `count`, `created_at` and `updated_at` (epoch millis).
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisCounterStoreConfig,
    /// Lua script: verify every expected count, then write every counter
    cas_script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisCounterStoreConfig) -> Result<Self, CounterStoreError> {
        let client = Client::open(config.redis.url.as_str())
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.redis.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| CounterStoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        // ARGV per key: expected (-1 = absent), count, created_at, updated_at, ttl_secs
        // Returns 1 when committed, 0 on conflict.
        let cas_script = Script::new(
            r#"
            for i, key in ipairs(KEYS) do
                local expected = tonumber(ARGV[(i - 1) * 5 + 1])
                local current = redis.call('HGET', key, 'count')
                if expected < 0 then
                    if current then
                        return 0
                    end
                elseif (not current) or tonumber(current) ~= expected then
                    return 0
                end
            end

            for i, key in ipairs(KEYS) do
                local base = (i - 1) * 5
                redis.call('HSETNX', key, 'created_at', ARGV[base + 3])
                redis.call('HSET', key, 'count', ARGV[base + 2], 'updated_at', ARGV[base + 4])
                redis.call('EXPIRE', key, tonumber(ARGV[base + 5]))
            end

            return 1
            "#,
        );

        tracing::info!(url = %config.redis.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            cas_script,
        })
    }

    /// The `{scope:principal}` hash tag keeps a principal's buckets in one cluster slot.
    fn make_key(&self, key: &CounterKey) -> String {
        format!(
            "{}:{{{}:{}}}:{}:{}",
            self.config.key_prefix, key.scope, key.principal_id, key.window_kind, key.window_key
        )
    }
}

fn parse_counter(
    key: &CounterKey,
    fields: &HashMap<String, String>,
) -> Result<QuotaCounter, CounterStoreError> {
    let field = |name: &str| -> Result<i64, CounterStoreError> {
        fields
            .get(name)
            .ok_or_else(|| CounterStoreError::Serialization(format!("missing field {name}")))?
            .parse::<i64>()
            .map_err(|e| CounterStoreError::Serialization(format!("field {name}: {e}")))
    };
    let timestamp = |name: &str| -> Result<DateTime<Utc>, CounterStoreError> {
        DateTime::from_timestamp_millis(field(name)?)
            .ok_or_else(|| CounterStoreError::Serialization(format!("field {name} out of range")))
    };

    let count = u64::try_from(field("count")?)
        .map_err(|e| CounterStoreError::Serialization(e.to_string()))?;

    Ok(QuotaCounter {
        key: key.clone(),
        count,
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
    })
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn load(
        &self,
        keys: &[CounterKey],
    ) -> Result<Vec<Option<QuotaCounter>>, CounterStoreError> {
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(self.make_key(key));
        }

        let mut conn = self.conn.clone();
        let hashes: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| CounterStoreError::Operation(e.to_string()))?;

        keys.iter()
            .zip(hashes.iter())
            .map(|(key, fields)| {
                if fields.is_empty() {
                    Ok(None)
                } else {
                    parse_counter(key, fields).map(Some)
                }
            })
            .collect()
    }

    async fn compare_and_swap(
        &self,
        writes: &[CounterWrite],
    ) -> Result<CasOutcome, CounterStoreError> {
        let mut invocation = self.cas_script.prepare_invoke();
        for write in writes {
            let counter = &write.counter;
            invocation
                .key(self.make_key(&counter.key))
                .arg(write.expected.map(|c| c as i64).unwrap_or(-1))
                .arg(counter.count)
                .arg(counter.created_at.timestamp_millis())
                .arg(counter.updated_at.timestamp_millis())
                .arg(bucket_ttl(counter.key.window_kind).as_secs());
        }

        let mut conn = self.conn.clone();
        let committed: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CounterStoreError::Operation(e.to_string()))?;

        Ok(if committed == 1 {
            CasOutcome::Committed
        } else {
            CasOutcome::Conflict
        })
    }
}
