//! Rate limiter orchestration.
//!
//! The orchestrator resolves the tier, consults the bypass registry, asks
//! the configured store for a decision, and records the outcome. It is
//! constructed from explicit dependencies by the hosting server's
//! composition root; there is no process-wide singleton.

use crate::application::breaker::{BreakerConfig, StoreBreaker};
use crate::application::bypass::BypassRegistry;
use crate::application::metrics::MetricsCollector;
use crate::application::ports::{BucketStore, Clock, ErrorSink, Severity};
use crate::application::tiers::TierRegistry;
use crate::domain::decision::{Decision, LimitHeaders};
use std::sync::Arc;
use std::time::Instant;

/// Decides, per incoming request, whether to admit or reject it.
///
/// # Fail-Open Behavior
/// A store failure never propagates past this boundary: the error is
/// reported to the [`ErrorSink`] exactly once and the request is treated
/// as not limited, preserving availability over strict enforcement. The
/// limiter is therefore infallible from the caller's point of view and can
/// never be the cause of a 5xx response.
#[derive(Clone)]
pub struct RateLimiter {
    tiers: Arc<TierRegistry>,
    bypass: Arc<BypassRegistry>,
    store: Arc<dyn BucketStore>,
    collector: MetricsCollector,
    sink: Arc<dyn ErrorSink>,
    breaker: Arc<StoreBreaker>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create an orchestrator from its collaborators.
    pub fn new(
        tiers: Arc<TierRegistry>,
        bypass: Arc<BypassRegistry>,
        store: Arc<dyn BucketStore>,
        collector: MetricsCollector,
        sink: Arc<dyn ErrorSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tiers,
            bypass,
            store,
            collector,
            sink,
            breaker: Arc::new(StoreBreaker::new()),
            clock,
        }
    }

    /// Replace the default store breaker tuning.
    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker = Arc::new(StoreBreaker::with_config(config));
        self
    }

    /// Check whether a request from `identifier` under `tier_name` must be
    /// rejected.
    ///
    /// Bypassed identifiers short-circuit with an unbounded decision
    /// without consulting any store. Every call, including bypassed ones,
    /// is recorded with the metrics collector; recording is in-memory only
    /// and adds no I/O to the decision latency.
    pub async fn is_limited(&self, identifier: &str, tier_name: &str) -> Decision {
        let started = Instant::now();

        if self.bypass.contains(identifier) {
            let decision = Decision::bypass();
            self.record(identifier, tier_name, &decision, started);
            return decision;
        }

        let tier = self.tiers.resolve(tier_name);

        let decision = if !self.breaker.permits_call() {
            // The store tripped the breaker recently; skip the call and
            // fail open without paying its timeout again
            tracing::debug!(identifier, tier = %tier.name, "store breaker open, failing open");
            Decision::fail_open(&tier, self.clock.now_ms())
        } else {
            match self.store.check(identifier, &tier).await {
                Ok(decision) => {
                    self.breaker.on_success();
                    decision
                }
                Err(e) => {
                    self.breaker.on_error();
                    self.sink
                        .report(&e, "store", Severity::Error, "rate_limiter");
                    Decision::fail_open(&tier, self.clock.now_ms())
                }
            }
        };

        self.record(identifier, &tier.name, &decision, started);
        decision
    }

    /// Run one check and derive the three rate limit header values from it.
    ///
    /// This consumes budget exactly like [`RateLimiter::is_limited`]; call
    /// one or the other per request, not both.
    pub async fn headers_for(
        &self,
        identifier: &str,
        tier_name: &str,
    ) -> (Decision, LimitHeaders) {
        let decision = self.is_limited(identifier, tier_name).await;
        let tier = self.tiers.resolve(tier_name);
        let headers = LimitHeaders::derive(&decision, &tier);
        (decision, headers)
    }

    fn record(&self, identifier: &str, tier_name: &str, decision: &Decision, started: Instant) {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.collector
            .record(identifier, tier_name, decision.limited, latency_ms);
    }

    /// The tier registry this limiter resolves against.
    pub fn tiers(&self) -> &Arc<TierRegistry> {
        &self.tiers
    }

    /// The bypass registry this limiter consults.
    pub fn bypass(&self) -> &Arc<BypassRegistry> {
        &self.bypass
    }

    /// The metrics collector receiving per-request outcomes.
    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// The breaker guarding the store.
    pub fn breaker(&self) -> &Arc<StoreBreaker> {
        &self.breaker
    }
}
