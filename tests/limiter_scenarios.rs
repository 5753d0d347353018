//! End-to-end limiter behavior against the local token bucket backend.

use chrono::{Duration, TimeZone, Utc};
use rategate::infrastructure::mocks::{MockClock, RecordingSink};
use rategate::{
    Algorithm, BucketStore, BypassRegistry, Decision, LocalBucketStore, MetricsCollector,
    MetricsConfig, RateLimiter, StoreError, Tier, TierRegistry,
};
use std::sync::Arc;

struct FailingStore;

#[async_trait::async_trait]
impl BucketStore for FailingStore {
    async fn check(&self, _identifier: &str, _tier: &Tier) -> Result<Decision, StoreError> {
        Err(StoreError::Unavailable("shared store offline".to_string()))
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }
}

fn mock_clock() -> Arc<MockClock> {
    Arc::new(MockClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

fn build_limiter(
    store: Arc<dyn BucketStore>,
    clock: Arc<MockClock>,
    sink: Arc<RecordingSink>,
) -> RateLimiter {
    let tiers = Arc::new(TierRegistry::new(
        Tier::new("default", 5, 1.0, 60).unwrap(),
    ));
    tiers.register(Tier::new("premium", 100, 10.0, 60).unwrap());
    let collector = MetricsCollector::new(MetricsConfig::default(), clock.clone(), None);
    RateLimiter::new(
        tiers,
        Arc::new(BypassRegistry::new()),
        store,
        collector,
        sink,
        clock,
    )
}

/// Tier {capacity: 5, refill: 1/s}: five immediate calls are admitted with
/// remaining 4,3,2,1,0 and the sixth is limited with remaining 0.
#[tokio::test]
async fn five_burst_calls_then_limited() {
    let clock = mock_clock();
    let store = Arc::new(LocalBucketStore::new(clock.clone()));
    let limiter = build_limiter(store, clock, Arc::new(RecordingSink::new()));

    for expected in [4, 3, 2, 1, 0] {
        let decision = limiter.is_limited("ip:1.2.3.4", "default").await;
        assert!(!decision.limited);
        assert_eq!(decision.remaining, expected);
    }

    let sixth = limiter.is_limited("ip:1.2.3.4", "default").await;
    assert!(sixth.limited);
    assert_eq!(sixth.remaining, 0);
}

/// An identifier added to the bypass list while limited is admitted on the
/// very next call, and stays exempt until removed.
#[tokio::test]
async fn bypass_takes_effect_immediately() {
    let clock = mock_clock();
    let store = Arc::new(LocalBucketStore::new(clock.clone()));
    let limiter = build_limiter(store, clock, Arc::new(RecordingSink::new()));

    for _ in 0..6 {
        limiter.is_limited("ip:1.2.3.4", "default").await;
    }
    assert!(limiter.is_limited("ip:1.2.3.4", "default").await.limited);

    limiter.bypass().add("ip:1.2.3.4");
    for _ in 0..20 {
        let decision = limiter.is_limited("ip:1.2.3.4", "default").await;
        assert!(!decision.limited, "bypassed identifier must never be limited");
        assert_eq!(decision.remaining, -1);
    }

    limiter.bypass().remove("ip:1.2.3.4");
    assert!(limiter.is_limited("ip:1.2.3.4", "default").await.limited);
}

/// Store failures fail open and forward exactly one error per failed call
/// to the sink.
#[tokio::test]
async fn store_failure_fails_open() {
    let clock = mock_clock();
    let sink = Arc::new(RecordingSink::new());
    let limiter = build_limiter(Arc::new(FailingStore), clock, sink.clone())
        .with_breaker_config(rategate::BreakerConfig {
            trip_threshold: 1000,
            cooldown: std::time::Duration::from_secs(30),
        });

    for i in 1..=4 {
        let decision = limiter.is_limited("ip:1.2.3.4", "default").await;
        assert!(!decision.limited);
        let reports = sink.reports();
        assert_eq!(reports.len(), i);
        assert_eq!(reports[0].category, "store");
        assert_eq!(reports[0].source, "rate_limiter");
    }
}

/// Header values always agree with the decision they were derived from.
#[tokio::test]
async fn headers_stay_consistent_with_decisions() {
    let clock = mock_clock();
    let store = Arc::new(LocalBucketStore::new(clock.clone()));
    let limiter = build_limiter(store, clock, Arc::new(RecordingSink::new()));

    for _ in 0..8 {
        let (decision, headers) = limiter.headers_for("ip:1.2.3.4", "default").await;
        assert_eq!(headers.limit, 5);
        assert!(headers.remaining <= 5);
        if decision.remaining >= 0 {
            assert_eq!(i64::from(headers.remaining), decision.remaining);
        }
        assert_eq!(headers.reset_secs, decision.reset_at_ms / 1000);
    }
}

/// After draining the bucket, waiting restores exactly the refilled budget.
#[tokio::test]
async fn refill_is_proportional_to_elapsed_time() {
    let clock = mock_clock();
    let store = Arc::new(LocalBucketStore::new(clock.clone()));
    let limiter = build_limiter(store, clock.clone(), Arc::new(RecordingSink::new()));

    for _ in 0..5 {
        assert!(!limiter.is_limited("ip:1.2.3.4", "default").await.limited);
    }

    // Three seconds at 1 token/sec buys exactly three more admissions
    clock.advance(Duration::seconds(3));
    for _ in 0..3 {
        assert!(!limiter.is_limited("ip:1.2.3.4", "default").await.limited);
    }
    assert!(limiter.is_limited("ip:1.2.3.4", "default").await.limited);
}

/// Tiers isolate budgets: the same identifier has independent buckets per
/// tier, and an unknown tier name resolves to the default.
#[tokio::test]
async fn tiers_have_independent_budgets() {
    let clock = mock_clock();
    let store = Arc::new(LocalBucketStore::new(clock.clone()));
    let limiter = build_limiter(store, clock, Arc::new(RecordingSink::new()));

    for _ in 0..6 {
        limiter.is_limited("ip:1.2.3.4", "default").await;
    }
    assert!(limiter.is_limited("ip:1.2.3.4", "default").await.limited);

    // Premium budget is untouched
    assert!(!limiter.is_limited("ip:1.2.3.4", "premium").await.limited);

    // Unknown tier shares the default tier's (exhausted) budget key
    assert!(
        limiter
            .is_limited("ip:1.2.3.4", "does-not-exist")
            .await
            .limited
    );
}
