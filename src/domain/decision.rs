//! Admission decisions and the response metadata derived from them.

use crate::domain::tier::Tier;

/// Outcome of a single rate limit check.
///
/// Computed fresh for every call and never persisted. `remaining` is `-1`
/// for bypassed identifiers, meaning "unbounded".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request must be rejected
    pub limited: bool,
    /// Requests left in the current budget, `-1` if unbounded
    pub remaining: i64,
    /// Epoch milliseconds at which the budget resets (`0` if unbounded)
    pub reset_at_ms: i64,
}

impl Decision {
    /// Decision for a bypassed identifier: never limited, unbounded budget.
    pub fn bypass() -> Self {
        Self {
            limited: false,
            remaining: -1,
            reset_at_ms: 0,
        }
    }

    /// Fail-open decision used when the backing store is unreachable.
    ///
    /// Availability wins over strict enforcement: the request is admitted
    /// and the budget is reported as untouched.
    pub fn fail_open(tier: &Tier, now_ms: i64) -> Self {
        Self {
            limited: false,
            remaining: i64::from(tier.capacity),
            reset_at_ms: now_ms + tier.window_ms(),
        }
    }

    /// Seconds until the budget resets, at least 1 for limited decisions.
    pub fn retry_after_secs(&self, now_ms: i64) -> i64 {
        let remaining_ms = self.reset_at_ms.saturating_sub(now_ms);
        ((remaining_ms + 999) / 1000).max(1)
    }
}

/// The three response header values derived from a [`Decision`].
///
/// `remaining` is clamped to `0..=limit`; an unbounded (bypassed) decision
/// reports the full tier capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitHeaders {
    /// `X-RateLimit-Limit`: the tier capacity
    pub limit: u32,
    /// `X-RateLimit-Remaining`: requests left, never negative
    pub remaining: u32,
    /// `X-RateLimit-Reset`: Unix seconds at which the budget resets
    pub reset_secs: i64,
}

impl LimitHeaders {
    /// Derive header values from a decision and the tier it was made under.
    pub fn derive(decision: &Decision, tier: &Tier) -> Self {
        let remaining = if decision.remaining < 0 {
            tier.capacity
        } else {
            decision.remaining.min(i64::from(tier.capacity)) as u32
        };
        Self {
            limit: tier.capacity,
            remaining,
            reset_secs: decision.reset_at_ms / 1000,
        }
    }
}
