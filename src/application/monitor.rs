//! Periodic snapshot and alert loop.
//!
//! The monitor owns the collection cadence: each tick rotates the metrics
//! collector into a snapshot, fans it out to subscribers, folds it into the
//! durable rollup, and runs the alert engine. Failures inside one tick are
//! reported to the error sink and never affect the next tick or request
//! handling.

use crate::application::alerts::AlertEngine;
use crate::application::metrics::MetricsCollector;
use crate::application::ports::{ErrorSink, EventSubscriber, Severity};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Monitor cadence.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often a snapshot is taken and evaluated
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Drives periodic snapshot emission and alert evaluation.
pub struct Monitor {
    collector: MetricsCollector,
    engine: Arc<AlertEngine>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    sink: Arc<dyn ErrorSink>,
    config: MonitorConfig,
}

impl Monitor {
    /// Create a monitor.
    pub fn new(
        collector: MetricsCollector,
        engine: Arc<AlertEngine>,
        sink: Arc<dyn ErrorSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            collector,
            engine,
            subscribers: Vec::new(),
            sink,
            config,
        }
    }

    /// Register a subscriber for snapshots and alerts.
    pub fn subscribe(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Run one monitoring cycle.
    ///
    /// Snapshot rotation and alert evaluation are infallible; only rollup
    /// persistence can fail, and that failure is reported rather than
    /// returned so a broken rollup store cannot stall alerting.
    pub async fn tick(&self) {
        let snapshot = self.collector.rotate();

        for subscriber in &self.subscribers {
            subscriber.on_snapshot(&snapshot);
        }

        if let Err(e) = self.collector.persist_rollup(&snapshot).await {
            tracing::warn!(error = %e, "failed to persist metrics rollup");
            self.sink
                .report(&e, "metrics", Severity::Warning, "monitor");
        }

        let alerts = self.engine.evaluate(&snapshot);
        for alert in &alerts {
            tracing::warn!(
                kind = ?alert.kind,
                message = %alert.message,
                "rate limit alert"
            );
            for subscriber in &self.subscribers {
                subscriber.on_alert(alert);
            }
        }
    }

    /// The alert engine this monitor evaluates with.
    pub fn engine(&self) -> &Arc<AlertEngine> {
        &self.engine
    }

    /// Spawn the monitoring loop on the current tokio runtime.
    ///
    /// The loop runs until the handle is aborted or the runtime shuts
    /// down.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            // The first tick completes immediately; skip it so the first
            // snapshot covers a full interval
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
