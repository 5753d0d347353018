//! Application layer - orchestration.

pub mod alerts;
pub mod breaker;
pub mod bypass;
pub mod limiter;
pub mod metrics;
pub mod monitor;
pub mod ports;
pub mod tiers;
