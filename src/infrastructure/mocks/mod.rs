//! Test doubles for the application ports.
//!
//! Exported so integration tests (and downstream users) can exercise the
//! limiter deterministically without a real clock, sink, or rollup store.

pub mod clock;
pub mod recorder;

pub use clock::MockClock;
pub use recorder::{MemoryRollupStore, RecordingSink, RecordingSubscriber};
