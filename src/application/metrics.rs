//! Metrics collection for limiter decisions.
//!
//! The collector does double bookkeeping by design: an in-memory bounded
//! history of per-interval snapshots (fast, approximate, feeds alerting)
//! and an optional durable per-day rollup behind the [`RollupStore`] port
//! (for historical queries). Recording sits on the request path and is
//! atomic-counter cheap; nothing here performs I/O except the explicitly
//! async rollup calls driven by the monitor task.

use crate::application::ports::{Clock, RollupStore, StoreError};
use crate::domain::snapshot::{IdentifierStats, Snapshot, TierStats};
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Collector tuning.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Latency samples kept per tier for average computation
    pub latency_sample_limit: usize,
    /// Snapshots kept in the in-memory history
    pub history_limit: usize,
    /// How long history entries and persisted rollups are retained
    pub retention: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_sample_limit: 1000,
            history_limit: 1440,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    total: AtomicU64,
    rejected: AtomicU64,
    latencies: Mutex<VecDeque<f64>>,
}

#[derive(Debug, Default)]
struct IdentifierCounters {
    total: AtomicU64,
    rejected: AtomicU64,
}

struct CollectorInner {
    total: AtomicU64,
    rejected: AtomicU64,
    by_tier: DashMap<String, TierCounters>,
    by_identifier: DashMap<String, IdentifierCounters>,
    history: Mutex<VecDeque<Snapshot>>,
    rollups: Option<Arc<dyn RollupStore>>,
    clock: Arc<dyn Clock>,
    config: MetricsConfig,
}

/// Records per-request outcomes and aggregates them into periodic
/// snapshots.
///
/// Cloning is cheap (shared state behind an `Arc`); the limiter and the
/// monitor task hold clones of the same collector.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
}

impl MetricsCollector {
    /// Create a collector.
    ///
    /// Pass a [`RollupStore`] to additionally persist per-day aggregates;
    /// without one, `daily_metrics` always answers `None`.
    pub fn new(
        config: MetricsConfig,
        clock: Arc<dyn Clock>,
        rollups: Option<Arc<dyn RollupStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                total: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                by_tier: DashMap::new(),
                by_identifier: DashMap::new(),
                history: Mutex::new(VecDeque::new()),
                rollups,
                clock,
                config,
            }),
        }
    }

    /// Record one limiter decision.
    ///
    /// Increments the global, per-tier, and per-identifier counters and
    /// appends the check latency to the tier's bounded sample ring.
    pub fn record(&self, identifier: &str, tier: &str, limited: bool, latency_ms: f64) {
        let inner = &self.inner;
        inner.total.fetch_add(1, Ordering::Relaxed);
        if limited {
            inner.rejected.fetch_add(1, Ordering::Relaxed);
        }

        let tier_entry = inner.by_tier.entry(tier.to_string()).or_default();
        tier_entry.total.fetch_add(1, Ordering::Relaxed);
        if limited {
            tier_entry.rejected.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut samples) = tier_entry.latencies.lock() {
            samples.push_back(latency_ms);
            while samples.len() > inner.config.latency_sample_limit {
                samples.pop_front();
            }
        }
        drop(tier_entry);

        let id_entry = inner.by_identifier.entry(identifier.to_string()).or_default();
        id_entry.total.fetch_add(1, Ordering::Relaxed);
        if limited {
            id_entry.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Build a snapshot of the current interval and reset the counters.
    ///
    /// Counters use snapshot-and-reset semantics so every snapshot covers
    /// exactly one interval; the latency rings keep rolling across
    /// intervals. The snapshot is appended to the bounded history.
    pub fn rotate(&self) -> Snapshot {
        let inner = &self.inner;

        let mut by_tier = BTreeMap::new();
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;
        for entry in inner.by_tier.iter() {
            let (sum, count, average) = match entry.latencies.lock() {
                Ok(samples) => {
                    let sum: f64 = samples.iter().sum();
                    let count = samples.len();
                    let average = if count == 0 { 0.0 } else { sum / count as f64 };
                    (sum, count, average)
                }
                Err(_) => (0.0, 0, 0.0),
            };
            latency_sum += sum;
            latency_count += count;

            by_tier.insert(
                entry.key().clone(),
                TierStats {
                    total: entry.total.swap(0, Ordering::Relaxed),
                    rejected: entry.rejected.swap(0, Ordering::Relaxed),
                    average_latency_ms: average,
                },
            );
        }

        let mut by_identifier = BTreeMap::new();
        for entry in inner.by_identifier.iter() {
            by_identifier.insert(
                entry.key().clone(),
                IdentifierStats {
                    total: entry.total.swap(0, Ordering::Relaxed),
                    rejected: entry.rejected.swap(0, Ordering::Relaxed),
                },
            );
        }
        // Identifier cardinality is unbounded; dropping the map each
        // interval is what keeps it bounded
        inner.by_identifier.clear();

        let snapshot = Snapshot {
            timestamp_ms: inner.clock.now_ms(),
            total_requests: inner.total.swap(0, Ordering::Relaxed),
            rejected_requests: inner.rejected.swap(0, Ordering::Relaxed),
            average_latency_ms: if latency_count == 0 {
                0.0
            } else {
                latency_sum / latency_count as f64
            },
            by_tier,
            by_identifier,
        };

        if let Ok(mut history) = inner.history.lock() {
            history.push_back(snapshot.clone());
            while history.len() > inner.config.history_limit {
                history.pop_front();
            }
        }

        snapshot
    }

    /// Fold a snapshot into the durable per-day rollup, if configured.
    pub async fn persist_rollup(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(rollups) = &self.inner.rollups {
            let date = date_of_ms(snapshot.timestamp_ms);
            rollups.record(date, snapshot).await?;
        }
        Ok(())
    }

    /// Read the durable aggregate for a calendar day.
    pub async fn daily_metrics(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError> {
        match &self.inner.rollups {
            Some(rollups) => rollups.load(date).await,
            None => Ok(None),
        }
    }

    /// Drop history entries and persisted rollups past the retention
    /// window.
    pub async fn cleanup(&self) -> Result<(), StoreError> {
        let inner = &self.inner;
        let retention_ms = inner.config.retention.as_millis() as i64;
        let cutoff_ms = inner.clock.now_ms() - retention_ms;

        if let Ok(mut history) = inner.history.lock() {
            history.retain(|snapshot| snapshot.timestamp_ms >= cutoff_ms);
        }

        if let Some(rollups) = &inner.rollups {
            rollups.prune(date_of_ms(cutoff_ms)).await?;
        }
        Ok(())
    }

    /// The in-memory snapshot history, oldest first.
    pub fn history(&self) -> Vec<Snapshot> {
        self.inner
            .history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn date_of_ms(timestamp_ms: i64) -> NaiveDate {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}
