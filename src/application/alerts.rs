//! Anomaly detection over metrics snapshots.
//!
//! The engine runs once per snapshot on the monitor task, so detection is
//! fully decoupled from request handling. Emitted alerts go into a bounded
//! in-memory history and are returned to the caller for fan-out.

use crate::application::ports::Clock;
use crate::domain::alert::{Alert, AlertKind};
use crate::domain::snapshot::Snapshot;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Detection thresholds.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Rejected-to-total ratio above which a rejection alert fires
    pub rejection_threshold: f64,
    /// Average check latency above which a latency alert fires
    pub latency_threshold_ms: f64,
    /// Per-tier growth ratio versus the previous interval above which a
    /// spike alert fires (2.0 means traffic more than doubled)
    pub spike_ratio: f64,
    /// Minimum requests in the current interval before spike detection
    /// applies; keeps near-idle tiers from alerting on noise
    pub spike_min_requests: u64,
    /// Alerts kept in the in-memory history
    pub history_limit: usize,
    /// How long alerts are retained before cleanup drops them
    pub retention: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rejection_threshold: 0.1,
            latency_threshold_ms: 1000.0,
            spike_ratio: 2.0,
            spike_min_requests: 10,
            history_limit: 1000,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Evaluates snapshots against thresholds and recent history.
pub struct AlertEngine {
    config: AlertConfig,
    clock: Arc<dyn Clock>,
    history: Mutex<VecDeque<Alert>>,
    previous: Mutex<Option<Snapshot>>,
}

impl AlertEngine {
    /// Create an engine.
    pub fn new(config: AlertConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            history: Mutex::new(VecDeque::new()),
            previous: Mutex::new(None),
        }
    }

    /// Evaluate one snapshot, returning the alerts it triggered.
    ///
    /// The snapshot also becomes the comparison baseline for the next
    /// interval's spike detection.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<Alert> {
        let now_ms = self.clock.now_ms();
        let mut alerts = Vec::new();

        self.check_rejection_rate(snapshot, now_ms, &mut alerts);
        self.check_latency(snapshot, now_ms, &mut alerts);
        self.check_traffic_spikes(snapshot, now_ms, &mut alerts);

        if let Ok(mut previous) = self.previous.lock() {
            *previous = Some(snapshot.clone());
        }

        if !alerts.is_empty() {
            if let Ok(mut history) = self.history.lock() {
                history.extend(alerts.iter().cloned());
                while history.len() > self.config.history_limit {
                    history.pop_front();
                }
            }
        }

        alerts
    }

    fn check_rejection_rate(&self, snapshot: &Snapshot, now_ms: i64, alerts: &mut Vec<Alert>) {
        if snapshot.total_requests == 0 {
            return;
        }
        let rate = snapshot.rejection_rate();
        if rate > self.config.rejection_threshold {
            alerts.push(Alert::new(
                now_ms,
                AlertKind::HighRejectionRate,
                format!(
                    "rejection rate {:.1}% over threshold {:.1}%",
                    rate * 100.0,
                    self.config.rejection_threshold * 100.0
                ),
                [
                    ("hit_percentage", json!(rate)),
                    ("total", json!(snapshot.total_requests)),
                    ("rejected", json!(snapshot.rejected_requests)),
                    ("threshold", json!(self.config.rejection_threshold)),
                ],
            ));
        }
    }

    fn check_latency(&self, snapshot: &Snapshot, now_ms: i64, alerts: &mut Vec<Alert>) {
        // Worst of the global average and any single tier's average
        let mut observed = snapshot.average_latency_ms;
        let mut worst_tier: Option<&str> = None;
        for (name, stats) in &snapshot.by_tier {
            if stats.average_latency_ms > observed {
                observed = stats.average_latency_ms;
                worst_tier = Some(name);
            }
        }

        if observed > self.config.latency_threshold_ms {
            alerts.push(Alert::new(
                now_ms,
                AlertKind::HighLatency,
                format!(
                    "check latency {:.1}ms over threshold {:.1}ms",
                    observed, self.config.latency_threshold_ms
                ),
                [
                    ("observed_ms", json!(observed)),
                    ("threshold_ms", json!(self.config.latency_threshold_ms)),
                    ("tier", json!(worst_tier)),
                ],
            ));
        }
    }

    fn check_traffic_spikes(&self, snapshot: &Snapshot, now_ms: i64, alerts: &mut Vec<Alert>) {
        let previous = match self.previous.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        let Some(previous) = previous else {
            return;
        };

        for (tier, stats) in &snapshot.by_tier {
            let current = stats.total;
            if current < self.config.spike_min_requests {
                continue;
            }
            let Some(before) = previous.by_tier.get(tier) else {
                continue;
            };
            if before.total == 0 {
                continue;
            }

            let ratio = current as f64 / before.total as f64;
            if ratio > self.config.spike_ratio {
                alerts.push(Alert::new(
                    now_ms,
                    AlertKind::TrafficSpike,
                    format!(
                        "tier {:?} traffic grew {:.1}x interval over interval",
                        tier, ratio
                    ),
                    [
                        ("tier", json!(tier)),
                        ("current", json!(current)),
                        ("previous", json!(before.total)),
                        ("ratio", json!(ratio)),
                    ],
                ));
            }
        }
    }

    /// Alerts currently held in the bounded history, oldest first.
    pub fn recent(&self) -> Vec<Alert> {
        self.history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop alerts older than the retention window.
    pub fn cleanup(&self) {
        let cutoff_ms = self.clock.now_ms() - self.config.retention.as_millis() as i64;
        if let Ok(mut history) = self.history.lock() {
            history.retain(|alert| alert.timestamp_ms >= cutoff_ms);
        }
    }
}
