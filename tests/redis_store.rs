//! Integration tests for the Redis sliding-window store.
//!
//! These tests require a Redis instance at `redis://127.0.0.1/`. They are
//! ignored by default - run with
//! `cargo test --features redis-storage --test redis_store -- --ignored`

#![cfg(feature = "redis-storage")]

use chrono::Utc;
use rategate::infrastructure::mocks::MemoryRollupStore;
use rategate::{
    Algorithm, BucketStore, RedisBucketStore, RedisRollupStore, RedisStoreConfig, RollupStore,
    Snapshot, SystemClock, Tier,
};
use std::sync::Arc;
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1/";

async fn redis_available() -> bool {
    RedisBucketStore::connect(REDIS_URL, Arc::new(SystemClock::new()))
        .await
        .is_ok()
}

async fn test_store(test_name: &str) -> RedisBucketStore {
    let config = RedisStoreConfig {
        key_prefix: format!("rategate-test:{}:", test_name),
        timeout: Duration::from_secs(2),
    };
    RedisBucketStore::connect_with_config(REDIS_URL, config, Arc::new(SystemClock::new()))
        .await
        .expect("Failed to connect to Redis")
}

fn unique_id(prefix: &str) -> String {
    // Millisecond timestamp keeps reruns from colliding with stale keys
    format!("{}:{}", prefix, Utc::now().timestamp_millis())
}

#[tokio::test]
#[ignore] // Requires Redis
async fn window_admits_capacity_then_rejects() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let store = test_store("capacity").await;
    let tier = Tier::new("default", 5, 1.0, 60).unwrap();
    let id = unique_id("ip:1.2.3.4");

    for expected in [4, 3, 2, 1, 0] {
        let decision = store.check(&id, &tier).await.unwrap();
        assert!(!decision.limited);
        assert_eq!(decision.remaining, expected);
    }

    let sixth = store.check(&id, &tier).await.unwrap();
    assert!(sixth.limited);
    assert_eq!(sixth.remaining, 0);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn window_slides_and_readmits() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let store = test_store("sliding").await;
    // Two second window keeps the test fast
    let tier = Tier::new("default", 3, 1.0, 2).unwrap();
    let id = unique_id("ip:1.2.3.4");

    for _ in 0..3 {
        assert!(!store.check(&id, &tier).await.unwrap().limited);
    }
    assert!(store.check(&id, &tier).await.unwrap().limited);

    // After the window passes the old entries age out
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(!store.check(&id, &tier).await.unwrap().limited);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn no_over_admission_under_concurrency() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let store = Arc::new(test_store("concurrent").await);
    let tier = Tier::new("default", 20, 1.0, 60).unwrap();
    let id = Arc::new(unique_id("ip:1.2.3.4"));

    let mut handles = vec![];
    for _ in 0..10 {
        let store_clone = Arc::clone(&store);
        let tier_clone = tier.clone();
        let id_clone = Arc::clone(&id);
        handles.push(tokio::spawn(async move {
            let mut admitted = 0u32;
            for _ in 0..10 {
                if !store_clone.check(&id_clone, &tier_clone).await.unwrap().limited {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }

    // 100 concurrent checks against one atomic script: exactly the
    // capacity is admitted
    assert_eq!(total, 20);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn advertises_sliding_window() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }
    let store = test_store("algorithm").await;
    assert_eq!(store.algorithm(), Algorithm::SlidingWindow);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn rollups_match_memory_semantics() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let config = RedisStoreConfig {
        key_prefix: format!("rategate-test:rollup:{}:", Utc::now().timestamp_millis()),
        timeout: Duration::from_secs(2),
    };
    let redis_rollups = RedisRollupStore::connect(
        REDIS_URL,
        config,
        Duration::from_secs(3600),
    )
    .await
    .expect("Failed to connect to Redis");
    let memory_rollups = MemoryRollupStore::new();

    let date = Utc::now().date_naive();
    let snapshot = Snapshot {
        timestamp_ms: Utc::now().timestamp_millis(),
        total_requests: 10,
        rejected_requests: 4,
        average_latency_ms: 1.5,
        ..Snapshot::default()
    };

    redis_rollups.record(date, &snapshot).await.unwrap();
    redis_rollups.record(date, &snapshot).await.unwrap();
    memory_rollups.record(date, &snapshot).await.unwrap();
    memory_rollups.record(date, &snapshot).await.unwrap();

    let from_redis = redis_rollups.load(date).await.unwrap().unwrap();
    let from_memory = memory_rollups.load(date).await.unwrap().unwrap();
    assert_eq!(from_redis.total_requests, from_memory.total_requests);
    assert_eq!(from_redis.rejected_requests, from_memory.rejected_requests);
    assert!((from_redis.average_latency_ms - from_memory.average_latency_ms).abs() < 0.01);

    // Pruning with a future cutoff removes the day
    let tomorrow = date.succ_opt().unwrap();
    redis_rollups.prune(tomorrow).await.unwrap();
    assert!(redis_rollups.load(date).await.unwrap().is_none());
}
