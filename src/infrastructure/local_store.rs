//! In-process token bucket storage.
//!
//! Each `(identifier, tier)` key owns a continuously refilling token
//! bucket. The concurrent map's entry lock gives per-key mutual exclusion
//! while keeping different keys fully independent; there is no global
//! lock. Buckets live until process restart, which is acceptable because
//! the key space is bounded by active identifiers.

use crate::application::ports::{Algorithm, BucketStore, Clock, StoreError};
use crate::domain::decision::Decision;
use crate::domain::tier::Tier;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill_ms: i64,
}

/// Continuous-refill token bucket store.
///
/// Admission is burst tolerant: a key idle long enough can spend up to
/// `capacity` requests instantly, after which it is throttled to the
/// tier's refill rate.
#[derive(Debug)]
pub struct LocalBucketStore {
    buckets: DashMap<String, Bucket>,
    clock: Arc<dyn Clock>,
}

impl LocalBucketStore {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket has been created yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn key(identifier: &str, tier: &Tier) -> String {
        format!("{}:{}", identifier, tier.name)
    }
}

#[async_trait]
impl BucketStore for LocalBucketStore {
    async fn check(&self, identifier: &str, tier: &Tier) -> Result<Decision, StoreError> {
        let now_ms = self.clock.now_ms();
        let capacity = f64::from(tier.capacity);

        // The entry guard holds the shard lock for this key, so the whole
        // read-refill-consume sequence is atomic per key
        let mut bucket = self
            .buckets
            .entry(Self::key(identifier, tier))
            .or_insert_with(|| Bucket {
                tokens: capacity,
                last_refill_ms: now_ms,
            });

        let elapsed_secs = (now_ms - bucket.last_refill_ms).max(0) as f64 / 1000.0;
        bucket.tokens =
            (bucket.tokens + elapsed_secs * tier.refill_rate_per_sec).min(capacity);
        bucket.last_refill_ms = now_ms;

        let decision = if bucket.tokens < 1.0 {
            let secs_until_token = (1.0 - bucket.tokens) / tier.refill_rate_per_sec;
            Decision {
                limited: true,
                remaining: bucket.tokens.floor() as i64,
                reset_at_ms: now_ms + (secs_until_token * 1000.0).ceil() as i64,
            }
        } else {
            bucket.tokens -= 1.0;
            // Reset advertises when the bucket is full again
            let secs_until_full = (capacity - bucket.tokens) / tier.refill_rate_per_sec;
            Decision {
                limited: false,
                remaining: bucket.tokens.floor() as i64,
                reset_at_ms: now_ms + (secs_until_full * 1000.0).ceil() as i64,
            }
        };

        Ok(decision)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }
}
