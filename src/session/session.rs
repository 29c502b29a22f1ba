use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a session that is present in the registry
///
/// Idle tabs have no entry at all, and finished sessions are removed, so
/// only the two in-flight states exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Recording,
    Stopping,
}

/// Recording session for a single tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Owning tab (registry key)
    pub tab_id: String,

    pub status: SessionStatus,

    /// Opaque capture handle from stream negotiation
    pub stream_id: String,

    pub start_time: DateTime<Utc>,

    pub end_time: Option<DateTime<Utc>>,

    /// Latest authoritative transcript text
    pub transcript_buffer: String,

    /// Number of audio chunks received from the capture worker
    pub audio_chunk_count: u64,

    /// Total audio payload bytes received
    pub audio_bytes: u64,
}

impl RecordingSession {
    pub(crate) fn new(tab_id: &str, stream_id: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            tab_id: tab_id.to_string(),
            status: SessionStatus::Recording,
            stream_id: stream_id.to_string(),
            start_time,
            end_time: None,
            transcript_buffer: String::new(),
            audio_chunk_count: 0,
            audio_bytes: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status == SessionStatus::Recording
    }
}
