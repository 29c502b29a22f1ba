//! Keep-alive heartbeat for the controller
//!
//! The host evicts idle controllers, and the controller is the only holder of
//! the session registry. A periodic liveness write keeps it resident.

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::KeepAliveConfig;
use crate::store::{KeyValueStore, LIVENESS_KEY};

pub struct KeepAliveScheduler {
    store: Arc<dyn KeyValueStore>,
    period: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    heartbeats: Arc<AtomicU64>,
}

impl KeepAliveScheduler {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &KeepAliveConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            period: config.heartbeat(),
            timer: Mutex::new(None),
            heartbeats: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Arm the heartbeat, replacing any timer that is already running
    pub fn activate(&self) {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
            debug!("Keep-alive timer reset");
        }

        let store = Arc::clone(&self.store);
        let heartbeats = Arc::clone(&self.heartbeats);
        let period = self.period;
        let first = Instant::now() + period;

        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                heartbeats.fetch_add(1, Ordering::SeqCst);

                let now = Utc::now().to_rfc3339();
                match store.set(LIVENESS_KEY, &now).await {
                    Ok(()) => debug!("Keep-alive heartbeat at {}", now),
                    Err(e) => warn!("Keep-alive heartbeat write failed: {:#}", e),
                }
            }
        }));

        info!("Keep-alive armed (every {}s)", period.as_secs());
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Heartbeats attempted since construction, failed writes included
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for KeepAliveScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
