use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::frames::{ClientFrame, ServerFrame};
use crate::config::TranscriptionConfig;

const LINK_BUFFER: usize = 64;

/// One open transcription stream
///
/// Dropping `outbound` closes the connection after pending frames are sent.
pub struct TranscriptionLink {
    pub outbound: mpsc::Sender<ClientFrame>,
    pub inbound: mpsc::Receiver<ServerFrame>,
}

impl TranscriptionLink {
    /// Build a link from raw channel halves; used by in-process services
    pub fn pair() -> (Self, mpsc::Receiver<ClientFrame>, mpsc::Sender<ServerFrame>) {
        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Open a stream for `session_id`, authenticating with `token`
    async fn open(&self, session_id: &str, token: &str) -> Result<TranscriptionLink>;
}

/// WebSocket client for the streaming transcription endpoint
pub struct WsTranscriptionService {
    url: String,
    source: String,
}

impl WsTranscriptionService {
    pub fn new(config: &TranscriptionConfig) -> Self {
        Self {
            url: config.stream_url(),
            source: config.source.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TranscriptionService for WsTranscriptionService {
    async fn open(&self, session_id: &str, token: &str) -> Result<TranscriptionLink> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        info!("Transcription stream connected for session {}", session_id);

        let (mut sink, mut stream) = ws.split();

        let auth = serde_json::to_string(&ClientFrame::auth(token, session_id, &self.source))?;
        sink.send(Message::Text(auth))
            .await
            .context("Failed to send auth frame")?;

        let (link, mut outbound, inbound) = TranscriptionLink::pair();

        let writer_session = session_id.to_string();
        tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                let header = match serde_json::to_string(&frame) {
                    Ok(header) => header,
                    Err(e) => {
                        warn!("Failed to encode transcription frame: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(header)).await.is_err() {
                    break;
                }
                if let Some(pcm) = frame.binary() {
                    if sink.send(Message::Binary(pcm.to_vec())).await.is_err() {
                        break;
                    }
                }
                if matches!(frame, ClientFrame::EndSession { .. }) {
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("Transcription writer for {} closed", writer_session);
        });

        let reader_session = session_id.to_string();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match ServerFrame::parse(&text) {
                    Ok(ServerFrame::Unknown) => debug!("Ignoring unknown transcription frame"),
                    Ok(frame) => {
                        if inbound.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Malformed transcription frame: {}", e),
                }
            }
            info!("Transcription stream closed for session {}", reader_session);
        });

        Ok(link)
    }
}
