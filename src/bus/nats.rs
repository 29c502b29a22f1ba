use anyhow::{Context, Result};
use async_nats::Client;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::{BusError, Channel, Envelope, MessageBus, Subscription};

/// Bus transport over NATS subjects
///
/// Channels map to `{prefix}.runtime` and `{prefix}.tab.{tab_id}`. NATS
/// gives no receiver feedback, so publishing never reports `NoReceiver`.
pub struct NatsBus {
    client: Client,
    prefix: String,
}

impl NatsBus {
    /// Connect to NATS server
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    pub fn subject(&self, channel: &Channel) -> String {
        subject_for(&self.prefix, channel)
    }
}

pub(crate) fn subject_for(prefix: &str, channel: &Channel) -> String {
    format!("{}.{}", prefix, channel)
}

#[async_trait::async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, channel: Channel, envelope: Envelope) -> Result<(), BusError> {
        let subject = self.subject(&channel);
        let payload = envelope.to_bytes()?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish envelope")?;

        debug!("Published {} to {}", envelope.kind, subject);

        Ok(())
    }

    async fn subscribe(&self, channel: Channel) -> Result<Subscription, BusError> {
        let subject = self.subject(&channel);

        info!("Subscribing to {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe")?;

        let stream = subscriber.filter_map(move |msg| {
            let decoded = match Envelope::from_bytes(&msg.payload) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!("Ignoring malformed message on {}: {:#}", msg.subject, e);
                    None
                }
            };
            futures::future::ready(decoded)
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_follow_channel_names() {
        assert_eq!(subject_for("recorder", &Channel::Runtime), "recorder.runtime");
        assert_eq!(
            subject_for("recorder", &Channel::tab("42")),
            "recorder.tab.42"
        );
    }
}
