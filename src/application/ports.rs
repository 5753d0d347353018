//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the
//! application layer needs. Infrastructure adapters implement these ports.

use crate::domain::{alert::Alert, decision::Decision, snapshot::Snapshot, tier::Tier};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Debug;
use std::time::Duration;

/// Error surfaced by a bucket or rollup store.
///
/// Store errors never propagate to request handling: the orchestrator
/// reports them through the [`ErrorSink`] and fails open.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store did not answer within the configured deadline
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    /// The store answered with data the adapter cannot interpret
    #[error("store returned malformed data: {0}")]
    Corrupt(String),
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A command failed inside the shared store
    #[cfg(feature = "redis-storage")]
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// The admission curve a [`BucketStore`] implements.
///
/// The two backends are deliberately not unified: a token bucket admits
/// bursts up to capacity and then leaks at the refill rate, while a sliding
/// window caps the count inside any rolling window. Switching backends
/// changes observable client behavior under the same tier, so the curve in
/// effect is advertised explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Continuous-refill token bucket (burst tolerant)
    TokenBucket,
    /// Rolling-window request counter (fixed quota per window)
    SlidingWindow,
}

/// Port for quota bookkeeping backends.
///
/// Implementations must be safe under arbitrary concurrent calls for the
/// same `(identifier, tier)` key and independent across different keys.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Account one request against the identifier's budget in `tier` and
    /// decide whether to admit it.
    async fn check(&self, identifier: &str, tier: &Tier) -> Result<Decision, StoreError>;

    /// The admission curve this backend implements.
    fn algorithm(&self) -> Algorithm;
}

/// Port for obtaining wall-clock time.
///
/// Decisions carry epoch timestamps that clients compare against their own
/// clocks, so the limiter works in wall time rather than monotonic time.
/// Infrastructure provides `SystemClock`; tests use the controllable
/// `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current wall-clock time as epoch milliseconds.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Severity attached to reports sent to the [`ErrorSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Port for the external error-reporting sink.
///
/// Every internal failure (store errors, rollup persistence errors) is
/// forwarded here; the limiter itself never turns one into a request
/// failure.
pub trait ErrorSink: Send + Sync {
    /// Report an internal failure.
    fn report(
        &self,
        error: &(dyn std::error::Error + 'static),
        category: &str,
        severity: Severity,
        source: &str,
    );
}

/// Port for subscribers to monitoring output.
///
/// Both callbacks default to no-ops so a subscriber can listen to only the
/// stream it cares about.
pub trait EventSubscriber: Send + Sync {
    /// Called once per monitoring interval with the fresh snapshot.
    fn on_snapshot(&self, _snapshot: &Snapshot) {}

    /// Called for every alert the engine emits.
    fn on_alert(&self, _alert: &Alert) {}
}

/// Port for durable per-day metric rollups.
///
/// The in-memory snapshot history is fast and approximate; implementations
/// of this port provide the optional durable aggregate used for historical
/// queries.
#[async_trait]
pub trait RollupStore: Send + Sync {
    /// Fold one interval snapshot into the aggregate for its calendar day.
    async fn record(&self, date: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Read back the aggregate for a calendar day, if any was recorded.
    async fn load(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError>;

    /// Delete aggregates for days strictly before `before`.
    async fn prune(&self, before: NaiveDate) -> Result<(), StoreError>;
}
