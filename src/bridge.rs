//! Request/response over the broadcast bus
//!
//! The bus only knows how to shout. [`RequestBridge`] publishes a request on
//! the runtime channel and waits, for a bounded time, for the first envelope
//! whose type is the expected reply type and whose tab id equals the
//! request's. The tab id is the correlation id, so a tab can have at most one
//! outstanding request per reply type.

use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusError, Channel, Envelope, MessageBus};
use crate::error::RecorderError;

/// Default bound on every bridge call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    response_type: String,
    tab_id: String,
}

enum Reply {
    Response(Envelope),
    /// The request was superseded before its reply arrived
    Stale,
}

struct Pending {
    id: u64,
    superseded: bool,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<PendingKey, Pending>>,
    next_id: AtomicU64,
    invalid: AtomicBool,
}

impl Shared {
    fn resolve(&self, envelope: Envelope) {
        let key = PendingKey {
            response_type: envelope.kind.clone(),
            tab_id: envelope.tab_id.clone(),
        };
        let Some(pending) = self.pending.lock().remove(&key) else {
            return;
        };

        let reply = if pending.superseded {
            debug!("Discarding stale {} for tab {}", key.response_type, key.tab_id);
            Reply::Stale
        } else {
            Reply::Response(envelope)
        };
        // The caller may have given up between removal and send
        let _ = pending.tx.send(reply);
    }

    /// Drop every pending sender so waiting callers observe a closed context
    fn shut_down(&self) {
        self.invalid.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
    }
}

/// Unregisters its listener when dropped, whichever way the call ends
struct ListenerGuard {
    shared: Arc<Shared>,
    key: PendingKey,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let mut pending = self.shared.pending.lock();
        if pending.get(&self.key).map(|p| p.id) == Some(self.id) {
            pending.remove(&self.key);
        }
    }
}

pub struct RequestBridge {
    bus: Arc<dyn MessageBus>,
    shared: Arc<Shared>,
    timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl RequestBridge {
    /// Subscribe to the runtime channel and start dispatching replies
    pub async fn attach(bus: Arc<dyn MessageBus>, timeout: Duration) -> Result<Self, BusError> {
        let mut replies = bus.subscribe(Channel::Runtime).await?;
        let shared = Arc::new(Shared::default());

        let dispatch = Arc::clone(&shared);
        let dispatcher = tokio::spawn(async move {
            while let Some(envelope) = replies.next().await {
                dispatch.resolve(envelope);
            }
            warn!("Bridge lost its runtime subscription");
            dispatch.shut_down();
        });

        info!(
            "Request bridge attached to {} bus (timeout {}ms)",
            bus.name(),
            timeout.as_millis()
        );

        Ok(Self {
            bus,
            shared,
            timeout,
            dispatcher,
        })
    }

    /// Publish `request` and wait for its `expected_type` reply
    pub async fn send(
        &self,
        request: Envelope,
        expected_type: &str,
    ) -> Result<Envelope, RecorderError> {
        if !self.is_available() {
            return Err(RecorderError::ContextUnavailable);
        }

        let operation = request.kind.clone();
        let tab_id = request.tab_id.clone();
        let (guard, rx) = self.register(expected_type, &tab_id, &operation)?;

        match self.bus.publish(Channel::Runtime, request).await {
            Ok(()) | Err(BusError::NoReceiver(_)) => {}
            Err(e) => {
                warn!("Failed to publish {} for tab {}: {}", operation, tab_id, e);
                return Err(RecorderError::ContextUnavailable);
            }
        }

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        drop(guard);

        match outcome {
            Ok(Ok(Reply::Response(envelope))) => Ok(envelope),
            Ok(Ok(Reply::Stale)) => Err(RecorderError::Superseded { tab_id }),
            Ok(Err(_)) => Err(RecorderError::ContextUnavailable),
            Err(_) => {
                warn!(
                    "{} for tab {} got no {} within {}ms",
                    operation,
                    tab_id,
                    expected_type,
                    self.timeout.as_millis()
                );
                Err(RecorderError::Timeout {
                    operation,
                    tab_id,
                    timeout: self.timeout,
                })
            }
        }
    }

    fn register(
        &self,
        expected_type: &str,
        tab_id: &str,
        operation: &str,
    ) -> Result<(ListenerGuard, oneshot::Receiver<Reply>), RecorderError> {
        let key = PendingKey {
            response_type: expected_type.to_string(),
            tab_id: tab_id.to_string(),
        };

        let mut pending = self.shared.pending.lock();
        if pending.contains_key(&key) {
            return Err(RecorderError::HandshakeInFlight {
                operation: operation.to_string(),
                tab_id: tab_id.to_string(),
            });
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        pending.insert(
            key.clone(),
            Pending {
                id,
                superseded: false,
                tx,
            },
        );

        let guard = ListenerGuard {
            shared: Arc::clone(&self.shared),
            key,
            id,
        };
        Ok((guard, rx))
    }

    /// Mark every outstanding request for `tab_id` stale; returns how many
    pub fn supersede(&self, tab_id: &str) -> usize {
        let mut pending = self.shared.pending.lock();
        let mut marked = 0;
        for (key, entry) in pending.iter_mut() {
            if key.tab_id == tab_id && !entry.superseded {
                entry.superseded = true;
                marked += 1;
            }
        }
        if marked > 0 {
            info!("Superseded {} pending request(s) for tab {}", marked, tab_id);
        }
        marked
    }

    pub fn has_pending(&self, tab_id: &str, expected_type: &str) -> bool {
        self.shared.pending.lock().contains_key(&PendingKey {
            response_type: expected_type.to_string(),
            tab_id: tab_id.to_string(),
        })
    }

    /// Number of registered reply listeners
    pub fn listener_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Declare this context dead; in-flight and future calls fail
    pub fn invalidate(&self) {
        info!("Request bridge invalidated");
        self.shared.shut_down();
    }

    pub fn is_available(&self) -> bool {
        !self.shared.invalid.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }
}

impl Drop for RequestBridge {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
