//! Clock adapters for time operations.
//!
//! Provides `SystemClock` for production use. See `MockClock` (in
//! `crate::infrastructure::mocks`) for a controllable test clock.

use crate::application::ports::Clock;
use chrono::{DateTime, Utc};

/// Wall-clock implementation backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let t1 = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = clock.now_ms();

        assert!(t2 > t1);
    }
}
