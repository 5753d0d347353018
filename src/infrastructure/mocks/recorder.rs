//! Recording test doubles for sinks, subscribers, and rollups.

use crate::application::ports::{ErrorSink, EventSubscriber, RollupStore, Severity, StoreError};
use crate::domain::alert::Alert;
use crate::domain::snapshot::{Snapshot, TierStats};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Mutex;

/// One report captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct CapturedReport {
    pub message: String,
    pub category: String,
    pub severity: Severity,
    pub source: String,
}

/// Error sink that captures every report for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<CapturedReport>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, in order.
    pub fn reports(&self) -> Vec<CapturedReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl ErrorSink for RecordingSink {
    fn report(
        &self,
        error: &(dyn std::error::Error + 'static),
        category: &str,
        severity: Severity,
        source: &str,
    ) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(CapturedReport {
                message: error.to_string(),
                category: category.to_string(),
                severity,
                source: source.to_string(),
            });
        }
    }
}

/// Subscriber that captures snapshots and alerts for assertions.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    snapshots: Mutex<Vec<Snapshot>>,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSubscriber {
    /// Create an empty subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots received so far, in order.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Alerts received so far, in order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl EventSubscriber for RecordingSubscriber {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot.clone());
        }
    }

    fn on_alert(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}

#[derive(Debug, Default, Clone)]
struct DayAccumulator {
    total: u64,
    rejected: u64,
    latency_weight_ms: f64,
    by_tier: std::collections::BTreeMap<String, TierStats>,
}

/// In-memory [`RollupStore`] with the same accumulation semantics as the
/// Redis-backed one.
#[derive(Debug, Default)]
pub struct MemoryRollupStore {
    days: DashMap<NaiveDate, DayAccumulator>,
}

impl MemoryRollupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of days holding data.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether no day holds data.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[async_trait]
impl RollupStore for MemoryRollupStore {
    async fn record(&self, date: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut day = self.days.entry(date).or_default();
        day.total += snapshot.total_requests;
        day.rejected += snapshot.rejected_requests;
        day.latency_weight_ms += snapshot.average_latency_ms * snapshot.total_requests as f64;
        for (tier, stats) in &snapshot.by_tier {
            let entry = day.by_tier.entry(tier.clone()).or_default();
            entry.total += stats.total;
            entry.rejected += stats.rejected;
        }
        Ok(())
    }

    async fn load(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.days.get(&date).map(|day| {
            let midnight = date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis())
                .unwrap_or_default();
            Snapshot {
                timestamp_ms: midnight,
                total_requests: day.total,
                rejected_requests: day.rejected,
                average_latency_ms: if day.total == 0 {
                    0.0
                } else {
                    day.latency_weight_ms / day.total as f64
                },
                by_tier: day.by_tier.clone(),
                by_identifier: Default::default(),
            }
        }))
    }

    async fn prune(&self, before: NaiveDate) -> Result<(), StoreError> {
        self.days.retain(|date, _| *date >= before);
        Ok(())
    }
}
