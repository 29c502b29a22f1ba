//! Message bus connecting the controller, capture worker and observers
//!
//! The bus is deliberately weak: messages are untyped [`Envelope`]s, every
//! subscriber of a channel sees every message, and nothing is acknowledged.
//! - `Channel::Runtime` reaches every context (requests, commands, replies)
//! - `Channel::Tab(id)` reaches only observers attached to that tab
//!
//! Two transports exist: [`LocalBus`] for contexts living in one process and
//! [`NatsBus`] for contexts spread across processes.

mod envelope;
mod local;
mod nats;

pub use envelope::Envelope;
pub use local::LocalBus;
pub use nats::NatsBus;

use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

/// Logical destination of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Every context of the application
    Runtime,
    /// Observers attached to a single tab
    Tab(String),
}

impl Channel {
    pub fn tab(tab_id: impl Into<String>) -> Self {
        Self::Tab(tab_id.into())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Tab(tab_id) => write!(f, "tab.{}", tab_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    /// Nobody is listening on the channel
    #[error("No receiver attached to {0}")]
    NoReceiver(Channel),

    #[error("Bus is closed")]
    Closed,

    #[error("Bus transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Stream of envelopes delivered on a channel
pub type Subscription = BoxStream<'static, Envelope>;

/// Asynchronous broadcast transport
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an envelope to every subscriber of `channel`
    async fn publish(&self, channel: Channel, envelope: Envelope) -> Result<(), BusError>;

    /// Subscribe to a channel; only messages published afterwards are seen
    async fn subscribe(&self, channel: Channel) -> Result<Subscription, BusError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
