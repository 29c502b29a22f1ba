//! Observer-side client
//!
//! Holds no recording state of its own. Every question goes to the
//! controller over the bus; events come from the tab's channel.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::bridge::RequestBridge;
use crate::bus::{BusError, Channel, Envelope, MessageBus, Subscription};
use crate::error::{ErrorReport, RecorderError, Remedy};
use crate::protocol::{
    self, Ack, AuthStatus, Failure, SetAuthToken, StartAccepted, StatusReply, StopAccepted,
};

pub struct ObserverClient {
    bridge: RequestBridge,
}

impl ObserverClient {
    pub async fn connect(bus: Arc<dyn MessageBus>, timeout: Duration) -> Result<Self, BusError> {
        Ok(Self {
            bridge: RequestBridge::attach(bus, timeout).await?,
        })
    }

    pub async fn start(&self, tab_id: &str) -> Result<StartAccepted, RecorderError> {
        self.call(Envelope::new(protocol::START_RECORDING, tab_id))
            .await
    }

    pub async fn stop(&self, tab_id: &str) -> Result<StopAccepted, RecorderError> {
        self.call(Envelope::new(protocol::STOP_RECORDING, tab_id))
            .await
    }

    pub async fn status(&self, tab_id: &str) -> Result<StatusReply, RecorderError> {
        self.call(Envelope::new(protocol::GET_RECORDING_STATUS, tab_id))
            .await
    }

    pub async fn auth_status(&self) -> Result<AuthStatus, RecorderError> {
        self.call(Envelope::new(protocol::GET_AUTH_STATUS, request_id()))
            .await
    }

    /// Store a token, or sign out with `None`
    pub async fn set_auth_token(
        &self,
        token: Option<String>,
        user: Option<Value>,
    ) -> Result<Ack, RecorderError> {
        let request = Envelope::with_payload(
            protocol::SET_AUTH_TOKEN,
            request_id(),
            &SetAuthToken { token, user },
        )
        .map_err(|e| malformed(format!("{:#}", e)))?;
        self.call(request).await
    }

    /// Tell the controller a tab went away
    pub async fn tab_removed(&self, tab_id: &str) -> Result<(), BusError> {
        let notice = Envelope::new(protocol::TAB_REMOVED, tab_id);
        match self.bridge.bus().publish(Channel::Runtime, notice).await {
            Ok(()) | Err(BusError::NoReceiver(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Live events addressed to `tab_id`
    pub async fn events(&self, tab_id: &str) -> Result<Subscription, BusError> {
        self.bridge.bus().subscribe(Channel::tab(tab_id)).await
    }

    pub fn bridge(&self) -> &RequestBridge {
        &self.bridge
    }

    async fn call<T: DeserializeOwned>(&self, request: Envelope) -> Result<T, RecorderError> {
        let expected = protocol::response_type(&request.kind)
            .ok_or_else(|| malformed(format!("{} expects no reply", request.kind)))?;
        let reply = self.bridge.send(request, expected).await?;
        decode_reply(&reply)
    }
}

/// Unique correlation id for requests not tied to a tab
fn request_id() -> String {
    format!("observer-{}", Uuid::new_v4())
}

fn malformed(message: String) -> RecorderError {
    RecorderError::Rejected(ErrorReport {
        code: "malformed_reply".to_string(),
        message,
        remedy: Remedy::Reload,
    })
}

/// Turn a controller reply into the typed success payload or its error
pub fn decode_reply<T: DeserializeOwned>(reply: &Envelope) -> Result<T, RecorderError> {
    if reply.field("success") == Some(&Value::Bool(false)) {
        let failure: Failure = reply.decode().map_err(|e| malformed(format!("{:#}", e)))?;
        debug!("{} rejected: {}", reply.kind, failure.report.message);
        return Err(RecorderError::from(failure.report));
    }
    reply.decode().map_err(|e| malformed(format!("{:#}", e)))
}

/// User-facing rendering of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub remedy: Remedy,
}

impl From<&RecorderError> for Notice {
    fn from(err: &RecorderError) -> Self {
        let remedy = err.remedy();
        let hint = match remedy {
            Remedy::None => None,
            Remedy::Reload => Some("Reload the page and try again."),
            Remedy::CheckPermissions => {
                Some("Make sure this tab can be captured and audio permission is granted.")
            }
            Remedy::SignIn => Some("Sign in to EdNoteAI to continue."),
            Remedy::Retry => Some("Please try again in a moment."),
        };

        let message = match hint {
            Some(hint) => format!("{} {}", err, hint),
            None => err.to_string(),
        };
        Self { message, remedy }
    }
}
