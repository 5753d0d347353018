//! Quota tiers.
//!
//! A tier is a named rate limit policy: how many requests a client may
//! burst (`capacity`), how fast its budget recovers (`refill_rate_per_sec`,
//! used by the token bucket backend), and the length of the rolling window
//! (`window_secs`, used by the sliding window backend).

use serde::{Deserialize, Serialize};

/// Name of the tier every unmatched request falls back to.
pub const DEFAULT_TIER: &str = "default";

/// Error returned when tier parameters fail validation.
///
/// Non-positive parameters are a caller error and are rejected at
/// construction time, never deferred to request time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    /// Capacity must be greater than zero
    #[error("tier {0:?}: capacity must be greater than 0")]
    ZeroCapacity(String),
    /// Refill rate must be a positive, finite number
    #[error("tier {0:?}: refill rate must be positive and finite")]
    InvalidRefillRate(String),
    /// Window must be greater than zero seconds
    #[error("tier {0:?}: window must be greater than 0 seconds")]
    ZeroWindow(String),
}

/// A named quota policy.
///
/// Tiers are immutable once constructed; re-registering under the same name
/// replaces the previous definition.
///
/// # Example
/// ```
/// use rategate::Tier;
///
/// let tier = Tier::new("api", 100, 10.0, 60).unwrap();
/// assert_eq!(tier.capacity, 100);
///
/// // Non-positive parameters are rejected up front.
/// assert!(Tier::new("broken", 0, 10.0, 60).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier name, used as the registry key
    pub name: String,
    /// Maximum burst size (token bucket) or requests per window (sliding window)
    pub capacity: u32,
    /// Tokens restored per second in the token bucket backend
    pub refill_rate_per_sec: f64,
    /// Rolling window length in seconds in the sliding window backend
    pub window_secs: u64,
}

impl Tier {
    /// Create a tier, validating that all parameters are positive.
    ///
    /// # Errors
    /// Returns a [`TierError`] naming the offending parameter.
    pub fn new(
        name: impl Into<String>,
        capacity: u32,
        refill_rate_per_sec: f64,
        window_secs: u64,
    ) -> Result<Self, TierError> {
        let name = name.into();
        if capacity == 0 {
            return Err(TierError::ZeroCapacity(name));
        }
        if !(refill_rate_per_sec.is_finite() && refill_rate_per_sec > 0.0) {
            return Err(TierError::InvalidRefillRate(name));
        }
        if window_secs == 0 {
            return Err(TierError::ZeroWindow(name));
        }
        Ok(Self {
            name,
            capacity,
            refill_rate_per_sec,
            window_secs,
        })
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_secs as i64 * 1000
    }
}
