//! Alerts raised by the monitoring loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The anomaly classes the alert engine detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// Rejection ratio over the configured threshold
    HighRejectionRate,
    /// Check latency over the configured threshold
    HighLatency,
    /// Per-tier traffic grew faster than the configured ratio
    TrafficSpike,
}

/// A single emitted alert.
///
/// `details` carries the raw numbers behind the alert so subscribers can
/// render or forward them without re-deriving anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// When the alert fired, epoch milliseconds
    pub timestamp_ms: i64,
    /// Anomaly class
    pub kind: AlertKind,
    /// Human-readable one-liner
    pub message: String,
    /// Structured context for the alert
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    /// Build an alert with a details map constructed from key/value pairs.
    pub fn new(
        timestamp_ms: i64,
        kind: AlertKind,
        message: impl Into<String>,
        details: impl IntoIterator<Item = (&'static str, serde_json::Value)>,
    ) -> Self {
        Self {
            timestamp_ms,
            kind,
            message: message.into(),
            details: details
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_details() {
        let alert = Alert::new(
            1_000,
            AlertKind::HighRejectionRate,
            "rejection rate 15.0% over threshold 10.0%",
            [("hit_percentage", json!(0.15)), ("total", json!(1000))],
        );

        assert_eq!(alert.kind, AlertKind::HighRejectionRate);
        assert_eq!(alert.details["hit_percentage"], json!(0.15));
        assert_eq!(alert.details["total"], json!(1000));
    }

    #[test]
    fn test_alert_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&AlertKind::TrafficSpike).unwrap(),
            "\"TrafficSpike\""
        );
    }
}
