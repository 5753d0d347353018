//! Periodic metrics snapshots.
//!
//! A snapshot covers one collection interval: request and rejection totals
//! globally, per tier, and per identifier, plus the rolling average latency
//! of the rate limit checks themselves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-tier request statistics within a snapshot interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    /// Requests checked against this tier
    pub total: u64,
    /// Requests rejected by this tier
    pub rejected: u64,
    /// Rolling average check latency for this tier, in milliseconds
    pub average_latency_ms: f64,
}

/// Per-identifier request statistics within a snapshot interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifierStats {
    /// Requests made by this identifier
    pub total: u64,
    /// Requests rejected for this identifier
    pub rejected: u64,
}

/// A point-in-time aggregate of limiter activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was taken, epoch milliseconds
    pub timestamp_ms: i64,
    /// Total requests in the interval
    pub total_requests: u64,
    /// Rejected requests in the interval
    pub rejected_requests: u64,
    /// Average check latency across all tiers, in milliseconds
    pub average_latency_ms: f64,
    /// Breakdown by tier name
    pub by_tier: BTreeMap<String, TierStats>,
    /// Breakdown by identifier
    pub by_identifier: BTreeMap<String, IdentifierStats>,
}

impl Snapshot {
    /// Rejected-to-total ratio, `0.0` when the interval saw no traffic.
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.rejected_requests as f64 / self.total_requests as f64
        }
    }
}
