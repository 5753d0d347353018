//! Redis-backed storage for distributed rate limiting.
//!
//! Multiple application instances sharing one Redis agree on a single
//! budget per `(identifier, tier)` key. The whole decision runs inside one
//! Lua script so two concurrent requests can never both observe spare
//! capacity and both be admitted.
//!
//! ## Key model
//!
//! - `{prefix}bucket:{identifier}:{tier}` - sorted set of request
//!   timestamps; members carry a unique tiebreaker so entries landing on
//!   the same millisecond never collide. TTL refreshed to the tier window
//!   on every write, so idle keys expire on their own.
//! - `{prefix}rollup:{YYYY-MM-DD}` - hash of per-day metric aggregates.
//!
//! ## Error handling
//!
//! Every call is wrapped in a bounded timeout; a slow or unreachable Redis
//! surfaces as a [`StoreError`] that the orchestrator turns into a
//! fail-open admission, never a request failure.

use crate::application::ports::{Algorithm, BucketStore, Clock, RollupStore, StoreError};
use crate::domain::decision::Decision;
use crate::domain::snapshot::{Snapshot, TierStats};
use crate::domain::tier::Tier;
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Prunes the window, counts, inserts, and refreshes the TTL in one atomic
/// step. Returns the entry count before the insert.
const WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local member = ARGV[3]

redis.call('ZREMRANGEBYSCORE', key, 0, now_ms - window_ms)
local count = redis.call('ZCARD', key)
redis.call('ZADD', key, now_ms, member)
redis.call('PEXPIRE', key, window_ms)
return count
"#;

/// Configuration for the Redis adapters.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prefix namespacing every key this crate writes
    pub key_prefix: String,
    /// Deadline for each store call; on expiry the caller fails open
    pub timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "rategate:".to_string(),
            timeout: Duration::from_millis(500),
        }
    }
}

/// Sliding-window counter store shared across processes.
///
/// Admission is a fixed quota per rolling window: at most `capacity`
/// requests inside any `window_secs` interval, with no burst allowance
/// beyond it. This is deliberately a different admission curve than the
/// local token bucket; see [`Algorithm`].
pub struct RedisBucketStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    script: Script,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisBucketStore {
    /// Connect with default configuration.
    ///
    /// # Errors
    /// Returns the underlying error if the connection cannot be
    /// established.
    pub async fn connect(url: &str, clock: Arc<dyn Clock>) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default(), clock).await
    }

    /// Connect with custom configuration.
    ///
    /// # Errors
    /// Returns the underlying error if the connection cannot be
    /// established.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(connection, config, clock))
    }

    /// Build a store over an existing connection manager.
    pub fn with_connection(
        connection: ConnectionManager,
        config: RedisStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection,
            config,
            script: Script::new(WINDOW_SCRIPT),
            clock,
        }
    }

    fn key(&self, identifier: &str, tier: &Tier) -> String {
        format!("{}bucket:{}:{}", self.config.key_prefix, identifier, tier.name)
    }
}

impl Clone for RedisBucketStore {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            config: self.config.clone(),
            script: Script::new(WINDOW_SCRIPT),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn check(&self, identifier: &str, tier: &Tier) -> Result<Decision, StoreError> {
        let key = self.key(identifier, tier);
        let now_ms = self.clock.now_ms();
        // Unique member so entries at the same millisecond never collide
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        // ConnectionManager is a cheap handle over one multiplexed
        // connection; cloning avoids serializing concurrent checks behind
        // a lock
        let mut connection = self.connection.clone();
        let mut invocation = self.script.key(&key);
        invocation.arg(now_ms).arg(tier.window_ms()).arg(member);

        let count_before = tokio::time::timeout(
            self.config.timeout,
            invocation.invoke_async::<i64>(&mut connection),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.config.timeout))??;

        let capacity = i64::from(tier.capacity);
        Ok(Decision {
            limited: count_before + 1 > capacity,
            remaining: (capacity - count_before - 1).max(0),
            reset_at_ms: now_ms + tier.window_ms(),
        })
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }
}

/// Durable per-day metric rollups in Redis hashes.
///
/// Each snapshot folds into its day's hash with `HINCRBY`; keys carry a
/// retention TTL as a backstop in addition to explicit pruning. Rollups
/// persist global and per-tier aggregates only - identifier cardinality
/// stays out of durable keys.
pub struct RedisRollupStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    retention: Duration,
}

impl std::fmt::Debug for RedisRollupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRollupStore")
            .field("config", &self.config)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl RedisRollupStore {
    /// Build a rollup store over an existing connection manager.
    pub fn with_connection(
        connection: ConnectionManager,
        config: RedisStoreConfig,
        retention: Duration,
    ) -> Self {
        Self {
            connection,
            config,
            retention,
        }
    }

    /// Connect with the given configuration.
    ///
    /// # Errors
    /// Returns the underlying error if the connection cannot be
    /// established.
    pub async fn connect(
        url: &str,
        config: RedisStoreConfig,
        retention: Duration,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(connection, config, retention))
    }

    fn key(&self, date: NaiveDate) -> String {
        format!("{}rollup:{}", self.config.key_prefix, date.format("%Y-%m-%d"))
    }

    fn parse_date(&self, key: &str) -> Option<NaiveDate> {
        let suffix = key.strip_prefix(&self.config.key_prefix)?.strip_prefix("rollup:")?;
        NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok()
    }
}

#[async_trait]
impl RollupStore for RedisRollupStore {
    async fn record(&self, date: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError> {
        let key = self.key(date);
        let latency_weight_us =
            (snapshot.average_latency_ms * snapshot.total_requests as f64 * 1000.0) as i64;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HINCRBY")
            .arg(&key)
            .arg("total")
            .arg(snapshot.total_requests)
            .ignore();
        pipe.cmd("HINCRBY")
            .arg(&key)
            .arg("rejected")
            .arg(snapshot.rejected_requests)
            .ignore();
        pipe.cmd("HINCRBY")
            .arg(&key)
            .arg("latency_us")
            .arg(latency_weight_us)
            .ignore();
        for (tier, stats) in &snapshot.by_tier {
            pipe.cmd("HINCRBY")
                .arg(&key)
                .arg(format!("tier:{}:total", tier))
                .arg(stats.total)
                .ignore();
            pipe.cmd("HINCRBY")
                .arg(&key)
                .arg(format!("tier:{}:rejected", tier))
                .arg(stats.rejected)
                .ignore();
        }
        pipe.cmd("EXPIRE")
            .arg(&key)
            .arg(self.retention.as_secs())
            .ignore();

        let mut connection = self.connection.clone();
        pipe.query_async::<()>(&mut connection).await?;
        Ok(())
    }

    async fn load(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError> {
        let key = self.key(date);
        let mut connection = self.connection.clone();
        let fields: BTreeMap<String, i64> = redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut connection)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let total = *fields.get("total").unwrap_or(&0) as u64;
        let rejected = *fields.get("rejected").unwrap_or(&0) as u64;
        let latency_us = *fields.get("latency_us").unwrap_or(&0);

        let mut by_tier: BTreeMap<String, TierStats> = BTreeMap::new();
        for (field, value) in &fields {
            let Some(rest) = field.strip_prefix("tier:") else {
                continue;
            };
            if let Some(tier) = rest.strip_suffix(":total") {
                by_tier.entry(tier.to_string()).or_default().total = *value as u64;
            } else if let Some(tier) = rest.strip_suffix(":rejected") {
                by_tier.entry(tier.to_string()).or_default().rejected = *value as u64;
            }
        }

        let midnight_ms = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();

        Ok(Some(Snapshot {
            timestamp_ms: midnight_ms,
            total_requests: total,
            rejected_requests: rejected,
            average_latency_ms: if total == 0 {
                0.0
            } else {
                latency_us as f64 / 1000.0 / total as f64
            },
            by_tier,
            by_identifier: BTreeMap::new(),
        }))
    }

    async fn prune(&self, before: NaiveDate) -> Result<(), StoreError> {
        let pattern = format!("{}rollup:*", self.config.key_prefix);
        let mut connection = self.connection.clone();

        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await?;

            let stale: Vec<String> = keys
                .into_iter()
                .filter(|key| matches!(self.parse_date(key), Some(date) if date < before))
                .collect();
            if !stale.is_empty() {
                redis::cmd("DEL")
                    .arg(&stale)
                    .query_async::<()>(&mut connection)
                    .await?;
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(())
    }
}
