// Keep-alive heartbeat timing on tokio's paused clock

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tab_recorder::config::KeepAliveConfig;
use tab_recorder::store::LIVENESS_KEY;
use tab_recorder::{KeepAliveScheduler, KeyValueStore, MemoryStore};
use tokio::time::sleep;

/// Store whose writes always fail
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        anyhow::bail!("quota exceeded")
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_writes_liveness_before_eviction() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let keepalive = KeepAliveScheduler::new(store.clone(), &KeepAliveConfig::default())?;
    keepalive.activate();

    sleep(Duration::from_secs(24)).await;
    assert_eq!(keepalive.heartbeats(), 0);
    assert!(store.get(LIVENESS_KEY).await?.is_none());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(keepalive.heartbeats(), 1);
    let stamp = store.get(LIVENESS_KEY).await?.expect("liveness written");
    assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());

    sleep(Duration::from_secs(25)).await;
    assert_eq!(keepalive.heartbeats(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reactivation_resets_instead_of_stacking() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let keepalive = KeepAliveScheduler::new(store, &KeepAliveConfig::default())?;

    keepalive.activate();
    sleep(Duration::from_secs(10)).await;
    keepalive.activate();

    // 34s after the first activation, 24s after the reset
    sleep(Duration::from_secs(24)).await;
    assert_eq!(keepalive.heartbeats(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(keepalive.heartbeats(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_repeated_activation_keeps_one_timer() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let keepalive = KeepAliveScheduler::new(store, &KeepAliveConfig::default())?;

    for _ in 0..5 {
        keepalive.activate();
    }
    sleep(Duration::from_secs(26)).await;

    assert_eq!(keepalive.heartbeats(), 1);
    assert!(keepalive.is_armed());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_writes_do_not_stop_rearming() -> Result<()> {
    let keepalive = KeepAliveScheduler::new(Arc::new(BrokenStore), &KeepAliveConfig::default())?;
    keepalive.activate();

    sleep(Duration::from_secs(25 * 3 + 1)).await;

    assert_eq!(keepalive.heartbeats(), 3);
    assert!(keepalive.is_armed());

    Ok(())
}

#[test]
fn test_period_must_be_shorter_than_eviction() {
    let store = Arc::new(MemoryStore::new());
    let config = KeepAliveConfig {
        heartbeat_secs: 30,
        eviction_threshold_secs: 30,
    };

    assert!(KeepAliveScheduler::new(store, &config).is_err());
}
