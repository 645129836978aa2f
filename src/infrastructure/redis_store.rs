//! Redis-backed store implementation.
//!
//! Provides the shared store used in production, so that every application
//! instance sees the same counters, lists and rate-limit buckets.
//!
//! ## Architecture
//!
//! - Keys: optional namespace followed by the 16 raw bytes of the derived key
//! - Bucket records: 16 bytes, two big-endian `i64`s, written by a Lua script
//! - Connection: `redis::aio::ConnectionManager`, cloned per call
//!
//! ## Token bucket script
//!
//! The whole acquisition (read, decode or initialize, refill, take, write)
//! runs as one Lua script, so Redis serializes concurrent callers. The script
//! is sent with `EVALSHA` and reloaded transparently if the server lost it.
//!
//! Lua numbers are doubles: bucket values and timestamps stay exact up to
//! 2^53, which covers unix milliseconds and any sane capacity.
//!
//! ## Error Handling
//!
//! - Connection, I/O and timeout failures map to `StoreUnavailable`
//! - A bucket record of the wrong width maps to `CorruptedState`
//! - Anything else Redis rejects maps to `UnexpectedStoreResponse`
//!
//! Nothing is retried here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tenant_kv::{RedisStore, RedisStoreConfig, SystemClock, Tenant, TenantStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tenant_kv::StoreError> {
//!     let config = RedisStoreConfig {
//!         url: "redis://127.0.0.1/".to_string(),
//!         key_namespace: "app:".to_string(),
//!     };
//!     let store = Arc::new(RedisStore::connect_with_config(config).await?);
//!     let tenant = Tenant::new("dataset-1")?;
//!     let store = TenantStore::new(tenant, store, Arc::new(SystemClock::new()));
//!
//!     store.increment("counter", &["requests".into()], 1).await?;
//!     Ok(())
//! }
//! ```

use crate::application::ports::{SetCondition, SetOptions, Store};
use crate::domain::error::StoreError;
use crate::domain::key::DerivedKey;
use crate::domain::policy::{Decision, RateLimitPolicy};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script, Value};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Error code the token bucket script raises for undecodable records.
const CORRUPTED_STATE_CODE: &str = "CORRUPTED_STATE";

/// Atomic token bucket acquisition.
///
/// KEYS[1]: bucket key.
/// ARGV: max_amount, refill_time_ms, refill_amount, take, at, strict ("1"/"0").
/// Returns `{admitted, remaining}` with admitted 1 or 0.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local max_amount = tonumber(ARGV[1])
local refill_time = tonumber(ARGV[2])
local refill_amount = tonumber(ARGV[3])
local take = tonumber(ARGV[4])
local at = tonumber(ARGV[5])
local strict = ARGV[6] == '1'
-- Lua numbers are doubles; keep the remainder exactly representable
local LENIENT_FLOOR = -9007199254740991

local kind = redis.call('TYPE', KEYS[1])['ok']
if kind ~= 'none' and kind ~= 'string' then
  return redis.error_reply('CORRUPTED_STATE key holds a ' .. kind)
end

local remaining
local next_refill_at
local raw = redis.call('GET', KEYS[1])
if raw then
  if #raw ~= 16 then
    return redis.error_reply('CORRUPTED_STATE record is ' .. #raw .. ' bytes, expected 16')
  end
  remaining, next_refill_at = struct.unpack('>i8>i8', raw)
else
  remaining = max_amount
  next_refill_at = at + refill_time
end

if at >= next_refill_at then
  local intervals = math.floor((at - next_refill_at) / refill_time) + 1
  if remaining < max_amount then
    remaining = math.min(max_amount, remaining + intervals * refill_amount)
  end
  next_refill_at = next_refill_at + intervals * refill_time
end

local after = remaining - take
if after < LENIENT_FLOOR then
  after = LENIENT_FLOOR
end
if strict and after < 0 then
  return {0, remaining}
end

redis.call('SET', KEYS[1], struct.pack('>i8>i8', after, next_refill_at), 'KEEPTTL')
return {1, after}
"#;

/// Configuration for Redis storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis connection URL (default: "redis://127.0.0.1/")
    pub url: String,
    /// Bytes prepended to every derived key (default: none)
    pub key_namespace: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1/".to_string(),
            key_namespace: String::new(),
        }
    }
}

/// Redis-backed implementation of the [`Store`] port.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    token_bucket: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_namespace", &self.config.key_namespace)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns `StoreUnavailable` if connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_config(RedisStoreConfig {
            url: url.to_string(),
            ..RedisStoreConfig::default()
        })
        .await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a malformed URL and `StoreUnavailable`
    /// if the connection fails.
    pub async fn connect_with_config(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::invalid_argument(format!("redis url: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::unavailable(format!("redis connect: {e}")))?;

        tracing::debug!(
            key_namespace = %config.key_namespace,
            "Connected to Redis store"
        );

        Ok(Self {
            connection,
            config,
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    /// Get the Redis key for a derived key.
    fn key(&self, key: &DerivedKey) -> Vec<u8> {
        let namespace = self.config.key_namespace.as_bytes();
        let mut out = Vec::with_capacity(namespace.len() + key.as_bytes().len());
        out.extend_from_slice(namespace);
        out.extend_from_slice(key.as_bytes());
        out
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

/// Translate a Redis failure into the crate's error taxonomy.
fn map_error(operation: &'static str, key: &DerivedKey, err: RedisError) -> StoreError {
    if err.code() == Some(CORRUPTED_STATE_CODE) {
        return StoreError::corrupted(key.to_hex(), err.detail().unwrap_or("undecodable record"));
    }

    let transient = err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
        || matches!(
            err.kind(),
            ErrorKind::BusyLoadingError
                | ErrorKind::TryAgain
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        );

    if transient {
        StoreError::unavailable(format!("{operation}: {err}"))
    } else {
        StoreError::unexpected(operation, err.to_string())
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

fn parse_number(bytes: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::unexpected("MGET", "value is not an integer"))
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &DerivedKey) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn();
        conn.get(self.key(key))
            .await
            .map_err(|e| map_error("GET", key, e))
    }

    async fn set(
        &self,
        key: &DerivedKey,
        value: &[u8],
        options: SetOptions,
    ) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        match options.condition {
            SetCondition::Always => {}
            SetCondition::IfAbsent => {
                cmd.arg("NX");
            }
            SetCondition::IfPresent => {
                cmd.arg("XX");
            }
        }
        if let Some(ttl) = options.ttl {
            // PX rejects 0
            cmd.arg("PX").arg(ttl_millis(ttl).max(1));
        }

        let mut conn = self.conn();
        let reply: Value = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("SET", key, e))?;

        match reply {
            Value::Okay => Ok(true),
            Value::Status(ref status) if status == "OK" => Ok(true),
            Value::Nil => Ok(false),
            other => Err(StoreError::unexpected(
                "SET",
                format!("neither applied nor skipped: {other:?}"),
            )),
        }
    }

    async fn delete(&self, key: &DerivedKey) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let removed: u64 = conn
            .del(self.key(key))
            .await
            .map_err(|e| map_error("DEL", key, e))?;
        Ok(removed > 0)
    }

    async fn eval_token_bucket(
        &self,
        key: &DerivedKey,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        let mut conn = self.conn();
        let (admitted, remaining): (i64, i64) = self
            .token_bucket
            .key(self.key(key))
            .arg(policy.max_amount)
            .arg(policy.refill_time_ms)
            .arg(policy.refill_amount)
            .arg(policy.take)
            .arg(policy.at)
            .arg(if policy.strict { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_error("EVALSHA", key, e))?;

        match admitted {
            1 => Ok(Decision::Admitted { remaining }),
            0 => Ok(Decision::Rejected { remaining }),
            other => Err(StoreError::unexpected(
                "EVALSHA",
                format!("admission flag {other}"),
            )),
        }
    }

    async fn list_push(&self, key: &DerivedKey, values: &[Vec<u8>]) -> Result<u64, StoreError> {
        if values.is_empty() {
            return Err(StoreError::invalid_argument("list_push needs at least one value"));
        }
        let mut conn = self.conn();
        redis::cmd("RPUSH")
            .arg(self.key(key))
            .arg(values)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("RPUSH", key, e))
    }

    async fn list_range(
        &self,
        key: &DerivedKey,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.conn();
        redis::cmd("LRANGE")
            .arg(self.key(key))
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("LRANGE", key, e))
    }

    async fn cardinality_add(
        &self,
        key: &DerivedKey,
        items: &[Vec<u8>],
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let changed: i64 = redis::cmd("PFADD")
            .arg(self.key(key))
            .arg(items)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("PFADD", key, e))?;
        Ok(changed == 1)
    }

    async fn cardinality_count(&self, key: &DerivedKey) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        redis::cmd("PFCOUNT")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("PFCOUNT", key, e))
    }

    async fn incr_by(&self, key: &DerivedKey, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn();
        redis::cmd("INCRBY")
            .arg(self.key(key))
            .arg(by)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("INCRBY", key, e))
    }

    async fn expire(&self, key: &DerivedKey, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let existed: i64 = redis::cmd("PEXPIRE")
            .arg(self.key(key))
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("PEXPIRE", key, e))?;
        Ok(existed == 1)
    }

    async fn get_many(&self, keys: &[DerivedKey]) -> Result<Vec<Option<i64>>, StoreError> {
        let Some(first) = keys.first() else {
            return Ok(Vec::new());
        };

        let redis_keys: Vec<Vec<u8>> = keys.iter().map(|k| self.key(k)).collect();
        let mut conn = self.conn();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(redis_keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("MGET", first, e))?;

        if values.len() != keys.len() {
            return Err(StoreError::unexpected(
                "MGET",
                format!("{} values for {} keys", values.len(), keys.len()),
            ));
        }

        values
            .into_iter()
            .map(|value| value.as_deref().map(parse_number).transpose())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1/");
        assert!(config.key_namespace.is_empty());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: RedisStoreConfig =
            serde_json::from_str(r#"{"key_namespace": "app:"}"#).unwrap();

        assert_eq!(config.url, "redis://127.0.0.1/");
        assert_eq!(config.key_namespace, "app:");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(b"-42").unwrap(), -42);
        assert!(matches!(
            parse_number(b"4.5"),
            Err(StoreError::UnexpectedStoreResponse { .. })
        ));
    }

    #[test]
    fn test_map_error_kinds() {
        let key = DerivedKey::from_bytes([0u8; 16]);

        let io: RedisError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(map_error("GET", &key, io).is_retryable());

        let wrong_type: RedisError = (ErrorKind::TypeError, "WRONGTYPE").into();
        assert!(matches!(
            map_error("GET", &key, wrong_type),
            StoreError::UnexpectedStoreResponse {
                operation: "GET",
                ..
            }
        ));
    }

    #[test]
    fn test_script_mentions_error_code() {
        assert!(TOKEN_BUCKET_SCRIPT.contains(CORRUPTED_STATE_CODE));
    }

    #[test]
    fn test_script_floors_lenient_remainder() {
        // -(2^53 - 1), well above REJECTED
        assert!(TOKEN_BUCKET_SCRIPT.contains("LENIENT_FLOOR = -9007199254740991"));
        assert!(TOKEN_BUCKET_SCRIPT.contains("after = LENIENT_FLOOR"));
        assert!(-9_007_199_254_740_991_i64 > crate::REJECTED);
    }
}
