//! # rategate
//!
//! Tiered rate limiting for HTTP services, with a local token bucket
//! backend for single-node deployments, a Redis sliding-window backend for
//! fleets, and a built-in monitoring loop that watches the limiter's own
//! behavior for abuse patterns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rategate::{
//!     BypassRegistry, LocalBucketStore, MetricsCollector, MetricsConfig,
//!     RateLimiter, SystemClock, Tier, TierRegistry, TracingErrorSink,
//! };
//! use std::sync::Arc;
//!
//! let clock = Arc::new(SystemClock::new());
//!
//! // Tiers: the default is mandatory, everything else is optional
//! let tiers = Arc::new(TierRegistry::new(
//!     Tier::new("default", 100, 10.0, 60).unwrap(),
//! ));
//! tiers.register(Tier::new("premium", 1000, 100.0, 60).unwrap());
//!
//! let limiter = RateLimiter::new(
//!     tiers,
//!     Arc::new(BypassRegistry::new()),
//!     Arc::new(LocalBucketStore::new(clock.clone())),
//!     MetricsCollector::new(MetricsConfig::default(), clock.clone(), None),
//!     Arc::new(TracingErrorSink::new()),
//!     clock,
//! );
//! ```
//!
//! Then, per request:
//!
//! ```rust,ignore
//! let decision = limiter.is_limited("ip:203.0.113.9", "premium").await;
//! if decision.limited {
//!     // respond 429, Retry-After from decision.reset_at_ms
//! }
//! ```
//!
//! Or let the tower middleware (feature `middleware`, on by default) do
//! the per-request work: identifier extraction, longest-prefix path→tier
//! resolution, the three `X-RateLimit-*` headers, and the 429 short
//! circuit.
//!
//! ## Choosing a backend
//!
//! The two backends implement **different admission curves** and each
//! advertises its curve via [`BucketStore::algorithm`]:
//!
//! - [`LocalBucketStore`] is a continuous-refill token bucket: a client
//!   idle long enough can burst up to `capacity` requests instantly, then
//!   is throttled to `refill_rate_per_sec`. State is process-local; behind
//!   a load balancer each instance enforces its own copy of the quota.
//! - `RedisBucketStore` (feature `redis-storage`) is a sliding-window
//!   counter shared through Redis: at most `capacity` requests within any
//!   `window_secs` interval, fleet-wide, with no burst allowance beyond
//!   it. The whole decision runs in one Lua script, so concurrent
//!   requests across processes cannot both take the last slot.
//!
//! Switching backends changes observable client behavior under identical
//! tiers; the choice is an explicit composition-root decision, not a
//! fallback chain.
//!
//! ## Fail-Open Operation
//!
//! The limiter is never the reason a request fails. Store errors and
//! timeouts are reported to the configured [`ErrorSink`] and the request
//! is admitted; a breaker additionally stops calling a store that keeps
//! failing, so a dead Redis does not add its timeout to every request.
//! The only user-visible effect of the limiter is the 429 it was asked to
//! produce.
//!
//! ## Monitoring
//!
//! Every decision is recorded in-memory (atomics, no I/O on the request
//! path). A [`Monitor`] task periodically rotates the counters into a
//! [`Snapshot`], fans it out to [`EventSubscriber`]s, optionally folds it
//! into a durable per-day rollup, and runs the [`AlertEngine`], which
//! flags high rejection rates, high check latency, and per-tier traffic
//! spikes:
//!
//! ```rust,no_run
//! # use rategate::{AlertConfig, AlertEngine, Monitor, MonitorConfig,
//! #     MetricsCollector, MetricsConfig, SystemClock, TracingErrorSink};
//! # use std::sync::Arc;
//! # let clock = Arc::new(SystemClock::new());
//! # let collector = MetricsCollector::new(MetricsConfig::default(), clock.clone(), None);
//! let engine = Arc::new(AlertEngine::new(AlertConfig::default(), clock.clone()));
//! let monitor = Monitor::new(
//!     collector.clone(),
//!     engine,
//!     Arc::new(TracingErrorSink::new()),
//!     MonitorConfig::default(),
//! );
//! # let _ =
//! monitor.spawn();
//! ```
//!
//! ## Bypass
//!
//! Identifiers in the [`BypassRegistry`] skip every store lookup and are
//! admitted unconditionally with an unbounded budget. Bypassed calls still
//! count in the metrics, so exempt traffic stays visible.

// Domain layer - pure types and invariants
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    alert::{Alert, AlertKind},
    decision::{Decision, LimitHeaders},
    snapshot::{IdentifierStats, Snapshot, TierStats},
    tier::{Tier, TierError, DEFAULT_TIER},
};

pub use application::{
    alerts::{AlertConfig, AlertEngine},
    breaker::{BreakerConfig, BreakerState, StoreBreaker},
    bypass::BypassRegistry,
    limiter::RateLimiter,
    metrics::{MetricsCollector, MetricsConfig},
    monitor::{Monitor, MonitorConfig},
    ports::{
        Algorithm, BucketStore, Clock, ErrorSink, EventSubscriber, RollupStore, Severity,
        StoreError,
    },
    tiers::TierRegistry,
};

pub use infrastructure::{
    clock::SystemClock, local_store::LocalBucketStore, sink::TracingErrorSink,
};

#[cfg(feature = "middleware")]
pub use infrastructure::middleware::{
    IdentifierStrategy, PrincipalId, RateLimitLayer, RateLimitService, RequestLimitConfig,
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_store::{RedisBucketStore, RedisRollupStore, RedisStoreConfig};
