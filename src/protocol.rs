//! Message names and typed payloads exchanged over the bus
//!
//! Uppercase names are observer-facing; lowercase names are the
//! controller <-> capture worker command set.

use serde::{Deserialize, Serialize};

use crate::config::AudioProfile;
use crate::error::{ErrorReport, Remedy};
use crate::session::{RecordingSession, SessionSummary};

// Observer requests
pub const START_RECORDING: &str = "START_RECORDING";
pub const STOP_RECORDING: &str = "STOP_RECORDING";
pub const GET_RECORDING_STATUS: &str = "GET_RECORDING_STATUS";
pub const GET_AUTH_STATUS: &str = "GET_AUTH_STATUS";
pub const SET_AUTH_TOKEN: &str = "SET_AUTH_TOKEN";
pub const TAB_REMOVED: &str = "TAB_REMOVED";

// Controller replies to observer requests
pub const START_RECORDING_RESPONSE: &str = "START_RECORDING_RESPONSE";
pub const STOP_RECORDING_RESPONSE: &str = "STOP_RECORDING_RESPONSE";
pub const RECORDING_STATUS: &str = "RECORDING_STATUS";
pub const AUTH_STATUS: &str = "AUTH_STATUS";
pub const SET_AUTH_TOKEN_RESPONSE: &str = "SET_AUTH_TOKEN_RESPONSE";

// Controller <-> capture worker
pub const WORKER_START: &str = "start-recording";
pub const WORKER_STOP: &str = "stop-recording";
pub const WORKER_START_RESPONSE: &str = "start-recording-response";
pub const AUDIO_DATA: &str = "AUDIO_DATA";

// Broadcast events
pub const RECORDING_STARTED: &str = "RECORDING_STARTED";
pub const RECORDING_STOPPED: &str = "RECORDING_STOPPED";
pub const AUDIO_DATA_RECEIVED: &str = "AUDIO_DATA_RECEIVED";
pub const TRANSCRIPT_UPDATE: &str = "TRANSCRIPT_UPDATE";
pub const TRANSCRIPTION_ERROR: &str = "TRANSCRIPTION_ERROR";
pub const CONNECTION_ESTABLISHED: &str = "CONNECTION_ESTABLISHED";
pub const NOTES_READY: &str = "NOTES_READY";
pub const AUTH_ERROR: &str = "AUTH_ERROR";
pub const AUTH_STATUS_CHANGED: &str = "AUTH_STATUS_CHANGED";

/// Reply type the controller uses for a given request type
pub fn response_type(request: &str) -> Option<&'static str> {
    match request {
        START_RECORDING => Some(START_RECORDING_RESPONSE),
        STOP_RECORDING => Some(STOP_RECORDING_RESPONSE),
        GET_RECORDING_STATUS => Some(RECORDING_STATUS),
        GET_AUTH_STATUS => Some(AUTH_STATUS),
        SET_AUTH_TOKEN => Some(SET_AUTH_TOKEN_RESPONSE),
        _ => None,
    }
}

/// `start-recording` command payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCapture {
    pub stream_id: String,
    pub audio_config: AudioProfile,
}

/// `start-recording-response` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub remedy: Remedy,
}

impl CaptureReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            remedy: Remedy::None,
        }
    }

    pub fn failed(error: impl Into<String>, remedy: Remedy) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            remedy,
        }
    }
}

/// `AUDIO_DATA` payload from the capture worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioData {
    /// Base64-encoded little-endian i16 PCM
    pub audio_data: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sequence: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Failure half of every controller reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    #[serde(flatten)]
    pub report: ErrorReport,
}

impl From<ErrorReport> for Failure {
    fn from(report: ErrorReport) -> Self {
        Self {
            success: false,
            report,
        }
    }
}

/// Bare success reply, e.g. `SET_AUTH_TOKEN_RESPONSE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// `START_RECORDING_RESPONSE` on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAccepted {
    pub success: bool,
    pub session_id: String,
    pub stream_id: String,
    pub audio_config: AudioProfile,
}

/// `STOP_RECORDING_RESPONSE` on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAccepted {
    pub success: bool,
    /// Set when there was nothing to stop
    #[serde(default)]
    pub no_active_session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
}

/// `RECORDING_STATUS` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub is_recording: bool,
    pub session: Option<RecordingSession>,
}

/// `AUTH_STATUS` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
}

/// `SET_AUTH_TOKEN` request; a missing token signs out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAuthToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// `RECORDING_STARTED` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStarted {
    pub session_id: String,
    pub audio_config: AudioProfile,
}

/// `RECORDING_STOPPED` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStopped {
    pub session_id: String,
    /// Milliseconds
    pub duration: i64,
    pub transcript: String,
}

/// `AUDIO_DATA_RECEIVED` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioReceived {
    pub chunk_count: u64,
    pub bytes: usize,
}

/// `TRANSCRIPT_UPDATE` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptUpdate {
    pub transcript: String,
    pub is_partial: bool,
    /// Passed through from the transcription service as sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
}

/// `TRANSCRIPTION_ERROR` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// `NOTES_READY` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesReady {
    pub notes: serde_json::Value,
    pub note_id: String,
    pub url: String,
}

/// `AUTH_STATUS_CHANGED` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatusChanged {
    pub authenticated: bool,
    pub user: Option<serde_json::Value>,
}
