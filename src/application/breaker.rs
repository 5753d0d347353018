//! Breaker guarding the quota store.
//!
//! When the backing store fails repeatedly, the limiter already fails open
//! per call, but each attempt still pays the store's error or timeout
//! latency. The breaker cuts that cost: after a run of consecutive
//! failures it stops calling the store for a cooldown period, then lets a
//! single probe through to test recovery.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Store calls flow normally
    Closed = 0,
    /// Store calls are skipped; every request fails open immediately
    Open = 1,
    /// One probe call is allowed through to test recovery
    Probing = 2,
}

impl From<u8> for BreakerState {
    fn from(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::Probing,
            _ => BreakerState::Closed,
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive store failures before the breaker trips
    pub trip_threshold: u32,
    /// How long to skip store calls before probing again
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Lock-free breaker around the bucket store.
///
/// All transitions use atomics; the breaker never blocks a request thread.
#[derive(Debug)]
pub struct StoreBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    tripped_at_nanos: AtomicU64,
    config: BreakerConfig,
    epoch: Instant,
}

impl StoreBreaker {
    /// Create a breaker with default tuning.
    pub fn new() -> Self {
        Self::with_config(BreakerConfig::default())
    }

    /// Create a breaker with custom tuning.
    pub fn with_config(config: BreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(BreakerState::Closed as u8),
            failures: AtomicU32::new(0),
            tripped_at_nanos: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    /// Current breaker state.
    pub fn state(&self) -> BreakerState {
        BreakerState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether the next store call should be attempted.
    ///
    /// Returns `false` while the breaker is open and inside the cooldown;
    /// the caller is expected to fail open without touching the store. On
    /// the first check after the cooldown elapses, exactly one caller wins
    /// the transition to [`BreakerState::Probing`] and gets to attempt the
    /// store.
    pub fn permits_call(&self) -> bool {
        match self.state() {
            BreakerState::Closed => true,
            // A probe is already in flight; everyone else fails open
            BreakerState::Probing => false,
            BreakerState::Open => {
                let tripped_at =
                    self.epoch + Duration::from_nanos(self.tripped_at_nanos.load(Ordering::Acquire));
                if tripped_at.elapsed() < self.config.cooldown {
                    return false;
                }
                // Only one thread wins the Open -> Probing transition
                self.state
                    .compare_exchange(
                        BreakerState::Open as u8,
                        BreakerState::Probing as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            }
        }
    }

    /// Record a successful store call, closing the breaker.
    pub fn on_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.state
            .store(BreakerState::Closed as u8, Ordering::Release);
    }

    /// Record a failed store call, tripping the breaker at the threshold.
    pub fn on_error(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;

        let should_trip = match self.state() {
            // A failed probe reopens immediately
            BreakerState::Probing => true,
            BreakerState::Closed => failures >= self.config.trip_threshold,
            BreakerState::Open => false,
        };

        if should_trip {
            let nanos = self
                .epoch
                .elapsed()
                .as_nanos()
                .try_into()
                .unwrap_or(u64::MAX);
            self.tripped_at_nanos.store(nanos, Ordering::Release);
            self.state.store(BreakerState::Open as u8, Ordering::Release);
        }
    }

    /// Consecutive failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Default for StoreBreaker {
    fn default() -> Self {
        Self::new()
    }
}
