//! The long-lived controller context
//!
//! Owns the session registry and answers observer requests arriving on the
//! runtime channel. Each request runs on its own task; audio chunks from the
//! capture worker are handled inline so their order is preserved.

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::convert::decode_pcm;
use crate::bridge::RequestBridge;
use crate::broadcast::EventBroadcaster;
use crate::bus::{BusError, Channel, Envelope, MessageBus, Subscription};
use crate::config::{AudioProfile, TranscriptionConfig};
use crate::error::{RecorderError, Remedy};
use crate::keepalive::KeepAliveScheduler;
use crate::protocol::{
    self, Ack, AudioData, AudioReceived, AuthStatus, Failure, NotesReady, RecordingStarted,
    RecordingStopped, SetAuthToken, StartAccepted, StatusReply, StopAccepted, TranscriptUpdate,
    TranscriptionError,
};
use crate::session::{EndOutcome, SessionRegistry};
use crate::store::{KeyValueStore, AUTH_TOKEN_KEY};
use crate::transcription::{ClientFrame, ServerFrame, TranscriptionLink, TranscriptionService};
use crate::worker::{CaptureWorkerSupervisor, StreamNegotiator};

/// Everything the controller context is wired to
pub struct ControllerDeps {
    pub bus: Arc<dyn MessageBus>,
    pub registry: Arc<SessionRegistry>,
    pub bridge: Arc<RequestBridge>,
    pub supervisor: Arc<CaptureWorkerSupervisor>,
    pub negotiator: Arc<dyn StreamNegotiator>,
    pub store: Arc<dyn KeyValueStore>,
    pub keepalive: Arc<KeepAliveScheduler>,
    /// `None` disables live transcription
    pub transcription: Option<Arc<dyn TranscriptionService>>,
    pub transcription_config: TranscriptionConfig,
    pub profile: AudioProfile,
}

struct Inner {
    bus: Arc<dyn MessageBus>,
    registry: Arc<SessionRegistry>,
    bridge: Arc<RequestBridge>,
    supervisor: Arc<CaptureWorkerSupervisor>,
    negotiator: Arc<dyn StreamNegotiator>,
    store: Arc<dyn KeyValueStore>,
    keepalive: Arc<KeepAliveScheduler>,
    transcription: Option<Arc<dyn TranscriptionService>>,
    transcription_config: TranscriptionConfig,
    profile: AudioProfile,
    broadcaster: EventBroadcaster,
    links: Mutex<HashMap<String, mpsc::Sender<ClientFrame>>>,
    /// Tabs with a start between reservation and `registry.begin`
    pending: Mutex<HashMap<String, PendingStart>>,
}

#[derive(Default)]
struct PendingStart {
    /// Set by a stop that arrived before the session was committed
    superseded: bool,
}

/// A tab's claim on an in-progress start
///
/// Released on drop, or by [`StartReservation::commit`].
struct StartReservation<'a> {
    pending: &'a Mutex<HashMap<String, PendingStart>>,
    tab_id: &'a str,
    released: bool,
}

impl StartReservation<'_> {
    fn is_superseded(&self) -> bool {
        self.pending
            .lock()
            .get(self.tab_id)
            .map(|start| start.superseded)
            .unwrap_or(true)
    }

    /// Release the claim and run `begin` under the same lock a stop takes,
    /// unless a stop got there first
    fn commit<T>(
        mut self,
        begin: impl FnOnce() -> Result<T, RecorderError>,
    ) -> Result<T, RecorderError> {
        let mut pending = self.pending.lock();
        self.released = true;
        let superseded = pending
            .remove(self.tab_id)
            .map(|start| start.superseded)
            .unwrap_or(true);
        if superseded {
            return Err(RecorderError::Superseded {
                tab_id: self.tab_id.to_string(),
            });
        }
        begin()
    }
}

impl Drop for StartReservation<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.pending.lock().remove(self.tab_id);
        }
    }
}

pub struct Controller {
    inner: Arc<Inner>,
    task: JoinHandle<()>,
}

impl Controller {
    /// Subscribe to the runtime channel and start serving requests
    pub async fn spawn(deps: ControllerDeps) -> Result<Self, BusError> {
        let messages = deps.bus.subscribe(Channel::Runtime).await?;

        let inner = Arc::new(Inner {
            broadcaster: EventBroadcaster::new(Arc::clone(&deps.bus)),
            bus: deps.bus,
            registry: deps.registry,
            bridge: deps.bridge,
            supervisor: deps.supervisor,
            negotiator: deps.negotiator,
            store: deps.store,
            keepalive: deps.keepalive,
            transcription: deps.transcription,
            transcription_config: deps.transcription_config,
            profile: deps.profile,
            links: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        });

        inner.keepalive.activate();
        let task = tokio::spawn(Arc::clone(&inner).run(messages));
        info!("Controller started");

        Ok(Self { inner, task })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.inner.broadcaster
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(&self) {
        self.task.abort();
        self.inner.bridge.invalidate();
        info!("Controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mut messages: Subscription) {
        while let Some(envelope) = messages.next().await {
            match envelope.kind.as_str() {
                protocol::AUDIO_DATA => self.on_audio_data(&envelope).await,
                protocol::START_RECORDING
                | protocol::STOP_RECORDING
                | protocol::GET_RECORDING_STATUS
                | protocol::GET_AUTH_STATUS
                | protocol::SET_AUTH_TOKEN
                | protocol::TAB_REMOVED => {
                    let inner = Arc::clone(&self);
                    tokio::spawn(async move { inner.handle_request(envelope).await });
                }
                _ => {}
            }
        }
        warn!("Controller lost its runtime subscription");
    }

    async fn handle_request(self: Arc<Self>, request: Envelope) {
        let tab_id = request.tab_id.clone();
        debug!("Handling {} for tab {}", request.kind, tab_id);

        match request.kind.as_str() {
            protocol::START_RECORDING => {
                let result = self.start_recording(&tab_id).await;
                self.reply(protocol::START_RECORDING_RESPONSE, &tab_id, result)
                    .await;
            }
            protocol::STOP_RECORDING => {
                let result = self.stop_recording(&tab_id).await;
                self.reply(protocol::STOP_RECORDING_RESPONSE, &tab_id, Ok(result))
                    .await;
            }
            protocol::GET_RECORDING_STATUS => {
                let session = self.registry.get(&tab_id);
                let status = StatusReply {
                    is_recording: session.as_ref().map(|s| s.is_recording()).unwrap_or(false),
                    session,
                };
                self.reply(protocol::RECORDING_STATUS, &tab_id, Ok(status))
                    .await;
            }
            protocol::GET_AUTH_STATUS => {
                let status = AuthStatus {
                    authenticated: self.auth_token().await.is_some(),
                };
                self.reply(protocol::AUTH_STATUS, &tab_id, Ok(status)).await;
            }
            protocol::SET_AUTH_TOKEN => {
                let result = self.set_auth_token(&request).await;
                self.reply(protocol::SET_AUTH_TOKEN_RESPONSE, &tab_id, result)
                    .await;
            }
            protocol::TAB_REMOVED => self.on_tab_removed(&tab_id).await,
            _ => {}
        }
    }

    async fn start_recording(self: &Arc<Self>, tab_id: &str) -> Result<StartAccepted, RecorderError> {
        let reservation = self.reserve_start(tab_id)?;

        let token = self.auth_token().await.ok_or(RecorderError::AuthRequired)?;

        self.keepalive.activate();
        self.supervisor.ensure_ready().await?;

        let stream_id = self.negotiator.negotiate(tab_id).await.map_err(|e| {
            warn!("Stream negotiation failed for tab {}: {:#}", tab_id, e);
            RecorderError::capture_setup(format!("{:#}", e), Remedy::CheckPermissions)
        })?;

        if reservation.is_superseded() {
            info!("Start for tab {} stopped before the worker was asked", tab_id);
            return Err(RecorderError::Superseded {
                tab_id: tab_id.to_string(),
            });
        }

        if let Err(e) = self.supervisor.start(tab_id, &stream_id, self.profile).await {
            warn!("Capture handshake failed for tab {}: {}", tab_id, e);
            // A worker that answers late must not keep capturing. An
            // in-flight rejection never reached the worker, and the capture
            // there belongs to the other handshake.
            if !matches!(e, RecorderError::HandshakeInFlight { .. }) {
                self.supervisor.stop(tab_id).await;
            }
            return Err(e);
        }

        let session = match reservation.commit(|| self.registry.begin(tab_id, &stream_id)) {
            Ok(session) => session,
            Err(e) => {
                info!("Start for tab {} superseded after the handshake", tab_id);
                self.supervisor.stop(tab_id).await;
                return Err(e);
            }
        };
        info!("Recording started for tab {} (stream={})", tab_id, stream_id);

        self.broadcaster
            .emit(
                tab_id,
                protocol::RECORDING_STARTED,
                &RecordingStarted {
                    session_id: session.tab_id.clone(),
                    audio_config: self.profile,
                },
            )
            .await;

        self.open_transcription(tab_id, token);

        Ok(StartAccepted {
            success: true,
            session_id: session.tab_id,
            stream_id,
            audio_config: self.profile,
        })
    }

    async fn stop_recording(&self, tab_id: &str) -> StopAccepted {
        let nothing_to_stop = StopAccepted {
            success: true,
            no_active_session: true,
            session: None,
        };

        let stopping = {
            let mut pending = self.pending.lock();
            match pending.get_mut(tab_id) {
                Some(start) => {
                    start.superseded = true;
                    false
                }
                None => self.registry.mark_stopping(tab_id).is_some(),
            }
        };
        if !stopping {
            // A start may still be mid-handshake for this tab
            self.bridge.supersede(tab_id);
            debug!("Stop for tab {} with no active session", tab_id);
            return nothing_to_stop;
        }

        self.supervisor.stop(tab_id).await;
        self.close_transcription(tab_id);

        match self.registry.end(tab_id) {
            EndOutcome::Ended(summary) => {
                info!(
                    "Recording stopped for tab {} after {}ms ({} chunks)",
                    tab_id,
                    summary.duration_ms,
                    summary.session.audio_chunk_count
                );
                self.broadcaster
                    .emit(
                        tab_id,
                        protocol::RECORDING_STOPPED,
                        &RecordingStopped {
                            session_id: tab_id.to_string(),
                            duration: summary.duration_ms,
                            transcript: summary.session.transcript_buffer.clone(),
                        },
                    )
                    .await;
                StopAccepted {
                    success: true,
                    no_active_session: false,
                    session: Some(summary),
                }
            }
            // Another stop for the same tab finished first
            EndOutcome::NoActiveSession => nothing_to_stop,
        }
    }

    async fn on_tab_removed(&self, tab_id: &str) {
        let stopped = self.stop_recording(tab_id).await;
        if !stopped.no_active_session {
            info!("Tab {} closed while recording", tab_id);
        }
    }

    /// Claim `tab_id` for a start, refusing a tab that is recording,
    /// stopping, or already being started
    fn reserve_start<'a>(&'a self, tab_id: &'a str) -> Result<StartReservation<'a>, RecorderError> {
        let mut pending = self.pending.lock();
        if self.registry.get(tab_id).is_some() {
            return Err(RecorderError::AlreadyRecording {
                tab_id: tab_id.to_string(),
            });
        }
        if pending.contains_key(tab_id) {
            return Err(RecorderError::HandshakeInFlight {
                operation: protocol::START_RECORDING.to_string(),
                tab_id: tab_id.to_string(),
            });
        }
        pending.insert(tab_id.to_string(), PendingStart::default());

        Ok(StartReservation {
            pending: &self.pending,
            tab_id,
            released: false,
        })
    }

    async fn set_auth_token(&self, request: &Envelope) -> Result<Ack, RecorderError> {
        // A garbled update must not read as a sign-out
        let update: SetAuthToken = request.decode().map_err(|e| RecorderError::MalformedRequest {
            kind: request.kind.clone(),
            cause: format!("{:#}", e),
        })?;
        let token = update.token.filter(|token| !token.is_empty());
        let authenticated = token.is_some();

        let stored = match &token {
            Some(token) => self.store.set(AUTH_TOKEN_KEY, token).await,
            None => self.store.remove(AUTH_TOKEN_KEY).await,
        };
        stored.map_err(|e| {
            error!("Failed to update auth token: {:#}", e);
            RecorderError::Storage {
                cause: format!("{:#}", e),
            }
        })?;

        info!("Auth state changed (authenticated={})", authenticated);
        self.broadcaster
            .broadcast_auth_update(authenticated, update.user, &self.registry.active_tabs())
            .await;

        Ok(Ack::ok())
    }

    async fn auth_token(&self) -> Option<String> {
        match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(e) => {
                warn!("Failed to read auth token: {:#}", e);
                None
            }
        }
    }

    async fn on_audio_data(&self, envelope: &Envelope) {
        let tab_id = envelope.tab_id.as_str();
        let data: AudioData = match envelope.decode() {
            Ok(data) => data,
            Err(e) => {
                warn!("Malformed audio chunk for tab {}: {:#}", tab_id, e);
                return;
            }
        };
        let pcm = match decode_pcm(&data.audio_data) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!("Undecodable audio chunk for tab {}: {}", tab_id, e);
                return;
            }
        };

        let Some(chunk_count) = self.registry.append_audio_chunk(tab_id, pcm.len()) else {
            return;
        };
        let bytes = pcm.len();

        let link = self.links.lock().get(tab_id).cloned();
        if let Some(link) = link {
            let frame = ClientFrame::audio_chunk(tab_id, pcm, data.sample_rate, data.channels);
            if let Err(e) = link.try_send(frame) {
                debug!("Transcription link for tab {} not accepting audio: {}", tab_id, e);
            }
        }

        self.broadcaster
            .emit(
                tab_id,
                protocol::AUDIO_DATA_RECEIVED,
                &AudioReceived { chunk_count, bytes },
            )
            .await;
    }

    fn open_transcription(self: &Arc<Self>, tab_id: &str, token: String) {
        let Some(service) = self.transcription.clone() else {
            return;
        };
        let inner = Arc::clone(self);
        let tab_id = tab_id.to_string();

        tokio::spawn(async move {
            match service.open(&tab_id, &token).await {
                Ok(link) => inner.attach_link(tab_id, link).await,
                Err(e) => {
                    warn!("Transcription unavailable for tab {}: {:#}", tab_id, e);
                    inner
                        .broadcaster
                        .emit(
                            &tab_id,
                            protocol::TRANSCRIPTION_ERROR,
                            &TranscriptionError {
                                error: format!("{:#}", e),
                                code: Some("connection_failed".to_string()),
                            },
                        )
                        .await;
                }
            }
        });
    }

    async fn attach_link(self: Arc<Self>, tab_id: String, link: TranscriptionLink) {
        let TranscriptionLink {
            outbound,
            mut inbound,
        } = link;

        let recording = self
            .registry
            .get(&tab_id)
            .map(|session| session.is_recording())
            .unwrap_or(false);
        if !recording {
            debug!("Session for tab {} ended before transcription connected", tab_id);
            let _ = outbound.send(ClientFrame::end_session(&tab_id)).await;
            return;
        }
        self.links.lock().insert(tab_id.clone(), outbound);

        // Notes can arrive after the session ends, so the reader outlives it
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                inner.on_server_frame(&tab_id, frame).await;
            }
            debug!("Transcription reader for tab {} finished", tab_id);
        });
    }

    fn close_transcription(&self, tab_id: &str) {
        let link = self.links.lock().remove(tab_id);
        if let Some(link) = link {
            if let Err(e) = link.try_send(ClientFrame::end_session(tab_id)) {
                debug!("Could not end transcription for tab {}: {}", tab_id, e);
            }
        }
    }

    async fn on_server_frame(&self, tab_id: &str, frame: ServerFrame) {
        match frame {
            ServerFrame::AuthSuccess => {
                let event = Envelope::new(protocol::CONNECTION_ESTABLISHED, tab_id)
                    .with("sessionId", tab_id);
                self.broadcaster.broadcast(tab_id, event).await;
            }
            ServerFrame::AuthFailed { message } => {
                if let Some(message) = message {
                    warn!("Transcription auth failed for tab {}: {}", tab_id, message);
                }
                let event = Envelope::new(protocol::AUTH_ERROR, tab_id)
                    .with("error", "Authentication failed. Please sign in again.")
                    .with("remedy", Remedy::SignIn);
                self.broadcaster.broadcast(tab_id, event).await;
            }
            ServerFrame::TranscriptPartial { text, timestamp } => {
                self.on_transcript(tab_id, text, true, timestamp).await
            }
            ServerFrame::TranscriptFinal { text, timestamp } => {
                self.on_transcript(tab_id, text, false, timestamp).await
            }
            ServerFrame::NotesGenerated { notes, note_id } => {
                info!("Notes {} ready for tab {}", note_id, tab_id);
                let payload = NotesReady {
                    notes,
                    url: self.transcription_config.note_url(&note_id),
                    note_id,
                };
                self.broadcaster
                    .emit(tab_id, protocol::NOTES_READY, &payload)
                    .await;
            }
            ServerFrame::Error { message, code } => {
                warn!("Transcription error for tab {}: {}", tab_id, message);
                self.broadcaster
                    .emit(
                        tab_id,
                        protocol::TRANSCRIPTION_ERROR,
                        &TranscriptionError {
                            error: message,
                            code,
                        },
                    )
                    .await;
            }
            ServerFrame::Unknown => {}
        }
    }

    async fn on_transcript(
        &self,
        tab_id: &str,
        text: String,
        is_partial: bool,
        timestamp: Option<serde_json::Value>,
    ) {
        if !self.registry.append_transcript(tab_id, &text, is_partial) {
            return;
        }
        self.broadcaster
            .emit(
                tab_id,
                protocol::TRANSCRIPT_UPDATE,
                &TranscriptUpdate {
                    transcript: text,
                    is_partial,
                    timestamp,
                },
            )
            .await;
    }

    async fn reply<T: Serialize>(
        &self,
        kind: &str,
        tab_id: &str,
        result: Result<T, RecorderError>,
    ) {
        let envelope = match &result {
            Ok(payload) => Envelope::with_payload(kind, tab_id, payload),
            Err(e) => {
                debug!("{} for tab {} failed: {}", kind, tab_id, e);
                Envelope::with_payload(kind, tab_id, &Failure::from(e.report()))
            }
        };

        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to encode {} for tab {}: {:#}", kind, tab_id, e);
                return;
            }
        };

        if let Err(e) = self.bus.publish(Channel::Runtime, envelope).await {
            debug!("{} for tab {} not delivered: {}", kind, tab_id, e);
        }
    }
}
