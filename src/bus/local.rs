use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::warn;

use super::{BusError, Channel, Envelope, MessageBus, Subscription};

/// Default per-channel buffer before slow subscribers start lagging
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process bus built on tokio broadcast channels
///
/// Slow subscribers lag and lose messages instead of applying
/// back-pressure to publishers.
pub struct LocalBus {
    capacity: usize,
    runtime: broadcast::Sender<Envelope>,
    tabs: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (runtime, _) = broadcast::channel(capacity);
        Self {
            capacity,
            runtime,
            tabs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live subscribers on a channel
    pub fn receiver_count(&self, channel: &Channel) -> usize {
        match channel {
            Channel::Runtime => self.runtime.receiver_count(),
            Channel::Tab(tab_id) => self
                .tabs
                .lock()
                .get(tab_id)
                .map(|tx| tx.receiver_count())
                .unwrap_or(0),
        }
    }

    /// Tab channels currently held open
    pub fn tab_channel_count(&self) -> usize {
        self.tabs.lock().len()
    }

    fn into_stream(rx: broadcast::Receiver<Envelope>, label: String) -> Subscription {
        futures::stream::unfold((rx, label), |(mut rx, label)| async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => return Some((envelope, (rx, label))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber on {} lagged, skipped {} messages", label, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait::async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, channel: Channel, envelope: Envelope) -> Result<(), BusError> {
        match &channel {
            Channel::Runtime => self
                .runtime
                .send(envelope)
                .map(|_| ())
                .map_err(|_| BusError::NoReceiver(channel)),
            Channel::Tab(tab_id) => {
                let mut tabs = self.tabs.lock();
                let delivered = match tabs.get(tab_id) {
                    Some(tx) => tx.send(envelope).is_ok(),
                    None => false,
                };
                if !delivered {
                    tabs.remove(tab_id);
                    return Err(BusError::NoReceiver(channel));
                }
                Ok(())
            }
        }
    }

    async fn subscribe(&self, channel: Channel) -> Result<Subscription, BusError> {
        let label = channel.to_string();
        let rx = match channel {
            Channel::Runtime => self.runtime.subscribe(),
            Channel::Tab(tab_id) => {
                let mut tabs = self.tabs.lock();
                // Channels whose observers all went away are never published
                // to again; drop them before adding a new one
                tabs.retain(|id, tx| *id == tab_id || tx.receiver_count() > 0);
                tabs.entry(tab_id)
                    .or_insert_with(|| broadcast::channel(self.capacity).0)
                    .subscribe()
            }
        };
        Ok(Self::into_stream(rx, label))
    }

    fn name(&self) -> &str {
        "local"
    }
}
