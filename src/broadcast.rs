//! Best-effort fan-out of lifecycle and streaming events
//!
//! The broadcaster does not track subscribers. Each event is offered to the
//! runtime channel and to the tab's own channel; whoever is listening gets
//! it, everyone else misses it. Observers that suspect a gap pull
//! `GET_RECORDING_STATUS` to resynchronize.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::{BusError, Channel, Envelope, MessageBus};
use crate::protocol::{self, AuthStatusChanged};

#[derive(Clone)]
pub struct EventBroadcaster {
    bus: Arc<dyn MessageBus>,
}

impl EventBroadcaster {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Deliver `event` to runtime listeners and to the tab's observer
    ///
    /// Never fails. Missing receivers and transport errors are logged.
    pub async fn broadcast(&self, tab_id: &str, event: Envelope) {
        let tab = Channel::tab(tab_id);
        self.offer(Channel::Runtime, event.clone()).await;
        self.offer(tab, event).await;
    }

    /// Build an event from a typed payload and broadcast it
    pub async fn emit<T: Serialize>(&self, tab_id: &str, kind: &str, payload: &T) {
        match Envelope::with_payload(kind, tab_id, payload) {
            Ok(event) => self.broadcast(tab_id, event).await,
            Err(e) => warn!("Dropping {} event for tab {}: {:#}", kind, tab_id, e),
        }
    }

    /// Tell every component the sign-in state changed
    ///
    /// Sent once on the runtime channel and once to each listed tab.
    pub async fn broadcast_auth_update(
        &self,
        authenticated: bool,
        user: Option<serde_json::Value>,
        tabs: &[String],
    ) {
        let payload = AuthStatusChanged {
            authenticated,
            user,
        };
        let event = match Envelope::with_payload(protocol::AUTH_STATUS_CHANGED, "", &payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping auth update: {:#}", e);
                return;
            }
        };

        self.offer(Channel::Runtime, event.clone()).await;
        for tab_id in tabs {
            let mut per_tab = event.clone();
            per_tab.tab_id = tab_id.clone();
            self.offer(Channel::tab(tab_id.as_str()), per_tab).await;
        }
    }

    async fn offer(&self, channel: Channel, event: Envelope) {
        let kind = event.kind.clone();
        match self.bus.publish(channel, event).await {
            Ok(()) => {}
            Err(BusError::NoReceiver(channel)) => {
                debug!("No observer on {} for {}", channel, kind);
            }
            Err(e) => {
                debug!("Failed to deliver {}: {}", kind, e);
            }
        }
    }
}
