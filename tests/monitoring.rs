//! Metrics collection, alerting, and the monitor loop working together.

use chrono::{TimeZone, Utc};
use rategate::infrastructure::mocks::{
    MemoryRollupStore, MockClock, RecordingSink, RecordingSubscriber,
};
use rategate::{
    AlertConfig, AlertEngine, AlertKind, Clock, MetricsCollector, MetricsConfig, Monitor,
    MonitorConfig,
};
use std::sync::Arc;

fn mock_clock() -> Arc<MockClock> {
    Arc::new(MockClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

fn monitor_with(
    clock: Arc<MockClock>,
    rollups: Option<Arc<MemoryRollupStore>>,
) -> (Monitor, MetricsCollector, Arc<RecordingSubscriber>) {
    let collector = MetricsCollector::new(
        MetricsConfig::default(),
        clock.clone(),
        rollups.map(|r| r as Arc<dyn rategate::RollupStore>),
    );
    let engine = Arc::new(AlertEngine::new(AlertConfig::default(), clock.clone()));
    let subscriber = Arc::new(RecordingSubscriber::new());
    let monitor = Monitor::new(
        collector.clone(),
        engine,
        Arc::new(RecordingSink::new()),
        MonitorConfig::default(),
    )
    .subscribe(subscriber.clone());
    (monitor, collector, subscriber)
}

/// 1000 requests with 150 rejections against a 0.1 threshold produce
/// exactly one HighRejectionRate alert with hit_percentage ~= 0.15.
#[tokio::test]
async fn rejection_rate_alert_fires_once_with_ratio() {
    let clock = mock_clock();
    let (monitor, collector, subscriber) = monitor_with(clock, None);

    for i in 0..1000 {
        collector.record("ip:1.1.1.1", "default", i < 150, 0.1);
    }
    monitor.tick().await;

    let alerts = subscriber.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::HighRejectionRate);
    let hit = alerts[0].details["hit_percentage"].as_f64().unwrap();
    assert!((hit - 0.15).abs() < 1e-9);
}

/// A quiet interval after a noisy one produces no alerts: counters reset
/// per interval rather than accumulating forever.
#[tokio::test]
async fn intervals_are_independent() {
    let clock = mock_clock();
    let (monitor, collector, subscriber) = monitor_with(clock, None);

    for i in 0..100 {
        collector.record("ip:1.1.1.1", "default", i < 50, 0.1);
    }
    monitor.tick().await;
    assert_eq!(subscriber.alerts().len(), 1);

    // Clean traffic in the next interval
    for _ in 0..100 {
        collector.record("ip:1.1.1.1", "default", false, 0.1);
    }
    monitor.tick().await;
    assert_eq!(subscriber.alerts().len(), 1, "no new alert for a clean interval");

    let snapshots = subscriber.snapshots();
    assert_eq!(snapshots[1].rejected_requests, 0);
}

/// Per-tier traffic growth across consecutive intervals raises a spike
/// alert carrying both counts.
#[tokio::test]
async fn traffic_spike_alert_compares_intervals() {
    let clock = mock_clock();
    let (monitor, collector, subscriber) = monitor_with(clock, None);

    for _ in 0..20 {
        collector.record("ip:1.1.1.1", "api", false, 0.1);
    }
    monitor.tick().await;

    for _ in 0..90 {
        collector.record("ip:1.1.1.1", "api", false, 0.1);
    }
    monitor.tick().await;

    let spikes: Vec<_> = subscriber
        .alerts()
        .into_iter()
        .filter(|a| a.kind == AlertKind::TrafficSpike)
        .collect();
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].details["current"], serde_json::json!(90));
    assert_eq!(spikes[0].details["previous"], serde_json::json!(20));
}

/// Snapshots fold into per-day rollups that daily_metrics can read back
/// across intervals.
#[tokio::test]
async fn daily_rollups_accumulate_across_ticks() {
    let clock = mock_clock();
    let rollups = Arc::new(MemoryRollupStore::new());
    let (monitor, collector, _subscriber) = monitor_with(clock.clone(), Some(rollups));

    for _ in 0..3 {
        for _ in 0..10 {
            collector.record("ip:1.1.1.1", "default", false, 0.5);
        }
        collector.record("ip:2.2.2.2", "default", true, 0.5);
        monitor.tick().await;
        clock.advance(chrono::Duration::minutes(1));
    }

    let daily = collector
        .daily_metrics(clock.now().date_naive())
        .await
        .unwrap()
        .expect("rollup for today");
    assert_eq!(daily.total_requests, 33);
    assert_eq!(daily.rejected_requests, 3);
    assert_eq!(daily.by_tier["default"].total, 33);
}

/// Old history and rollups disappear after cleanup.
#[tokio::test]
async fn cleanup_enforces_retention() {
    let clock = mock_clock();
    let rollups = Arc::new(MemoryRollupStore::new());
    let collector = MetricsCollector::new(
        MetricsConfig {
            retention: std::time::Duration::from_secs(24 * 60 * 60),
            ..MetricsConfig::default()
        },
        clock.clone(),
        Some(rollups as Arc<dyn rategate::RollupStore>),
    );

    collector.record("ip:1.1.1.1", "default", false, 0.1);
    let snapshot = collector.rotate();
    collector.persist_rollup(&snapshot).await.unwrap();
    let day_one = clock.now().date_naive();

    clock.advance(chrono::Duration::days(3));
    collector.cleanup().await.unwrap();

    assert!(collector.history().is_empty());
    assert!(collector.daily_metrics(day_one).await.unwrap().is_none());
}

/// The spawned loop keeps ticking without any manual driving.
#[tokio::test]
async fn spawned_monitor_emits_snapshots() {
    let clock = mock_clock();
    let collector = MetricsCollector::new(MetricsConfig::default(), clock.clone(), None);
    let engine = Arc::new(AlertEngine::new(AlertConfig::default(), clock));
    let subscriber = Arc::new(RecordingSubscriber::new());
    let monitor = Monitor::new(
        collector.clone(),
        engine,
        Arc::new(RecordingSink::new()),
        MonitorConfig {
            interval: std::time::Duration::from_millis(10),
        },
    )
    .subscribe(subscriber.clone());

    collector.record("ip:1.1.1.1", "default", false, 0.1);
    let handle = monitor.spawn();
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    handle.abort();

    let snapshots = subscriber.snapshots();
    assert!(snapshots.len() >= 2);
    assert_eq!(
        snapshots.iter().map(|s| s.total_requests).sum::<u64>(),
        1,
        "the one recorded request appears in exactly one interval"
    );
}
