use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::session::{RecordingSession, SessionStatus};
use super::stats::{EndOutcome, SessionSummary};
use crate::clock::{Clock, SystemClock};
use crate::error::RecorderError;

/// Single source of truth for recording sessions, keyed by tab id
///
/// Every operation takes the lock once and releases it before returning,
/// so no mutation is ever split across an await point.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, RecordingSession>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Record a new session after a successful start handshake
    pub fn begin(&self, tab_id: &str, stream_id: &str) -> Result<RecordingSession, RecorderError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(tab_id) {
            return Err(RecorderError::AlreadyRecording {
                tab_id: tab_id.to_string(),
            });
        }

        let session = RecordingSession::new(tab_id, stream_id, self.clock.now());
        sessions.insert(tab_id.to_string(), session.clone());
        info!("Session started for tab {} (stream={})", tab_id, stream_id);

        Ok(session)
    }

    /// Finish and remove the session for `tab_id`
    pub fn end(&self, tab_id: &str) -> EndOutcome {
        let removed = self.sessions.lock().remove(tab_id);

        let Some(mut session) = removed else {
            debug!("No active session to end for tab {}", tab_id);
            return EndOutcome::NoActiveSession;
        };

        let end_time = self.clock.now();
        session.end_time = Some(end_time);
        let duration_ms = end_time
            .signed_duration_since(session.start_time)
            .num_milliseconds();

        info!(
            "Session ended for tab {} ({:.1}s, {} chunks)",
            tab_id,
            duration_ms as f64 / 1000.0,
            session.audio_chunk_count
        );

        EndOutcome::Ended(SessionSummary {
            session,
            duration_ms,
        })
    }

    pub fn get(&self, tab_id: &str) -> Option<RecordingSession> {
        self.sessions.lock().get(tab_id).cloned()
    }

    /// Move a recording session into `stopping`; `None` when idle
    pub fn mark_stopping(&self, tab_id: &str) -> Option<RecordingSession> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(tab_id)?;
        session.status = SessionStatus::Stopping;
        Some(session.clone())
    }

    /// Count an audio chunk; returns the new count, or `None` if dropped
    pub fn append_audio_chunk(&self, tab_id: &str, chunk_len: usize) -> Option<u64> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(tab_id) {
            Some(session) => {
                session.audio_chunk_count += 1;
                session.audio_bytes += chunk_len as u64;
                Some(session.audio_chunk_count)
            }
            None => {
                debug!("Dropping audio chunk for tab {} (no active session)", tab_id);
                None
            }
        }
    }

    /// Replace the transcript buffer with the latest text
    pub fn append_transcript(&self, tab_id: &str, text: &str, is_partial: bool) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(tab_id) {
            Some(session) => {
                session.transcript_buffer.clear();
                session.transcript_buffer.push_str(text);
                true
            }
            None => {
                debug!(
                    "Dropping transcript for tab {} (partial={}, no active session)",
                    tab_id, is_partial
                );
                false
            }
        }
    }

    pub fn active_tabs(&self) -> Vec<String> {
        let mut tabs: Vec<String> = self.sessions.lock().keys().cloned().collect();
        tabs.sort();
        tabs
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn registry() -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 10, 27, 14, 30, 0).unwrap(),
        ));
        (SessionRegistry::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_begin_then_get_returns_recording_session() {
        let (registry, _) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();

        let session = registry.get("tab-1").unwrap();
        assert_eq!(session.status, SessionStatus::Recording);
        assert_eq!(session.stream_id, "stream-abc");
        assert_eq!(session.end_time, None);
        assert!(session.transcript_buffer.is_empty());
    }

    #[test]
    fn test_second_begin_fails_and_keeps_original() {
        let (registry, clock) = registry();
        let first = registry.begin("tab-1", "stream-abc").unwrap();

        clock.advance(chrono::Duration::seconds(5));
        let err = registry.begin("tab-1", "stream-other").unwrap_err();

        assert_eq!(
            err,
            RecorderError::AlreadyRecording {
                tab_id: "tab-1".to_string()
            }
        );
        let current = registry.get("tab-1").unwrap();
        assert_eq!(current.start_time, first.start_time);
        assert_eq!(current.stream_id, "stream-abc");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_end_computes_duration_and_removes() {
        let (registry, clock) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();
        clock.advance(chrono::Duration::milliseconds(42_500));

        let EndOutcome::Ended(summary) = registry.end("tab-1") else {
            panic!("recording session should end");
        };
        let end_time = summary.session.end_time.unwrap();

        assert_eq!(summary.duration_ms, 42_500);
        assert_eq!(
            summary.duration_ms,
            end_time
                .signed_duration_since(summary.session.start_time)
                .num_milliseconds()
        );
        assert!(registry.get("tab-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_end_without_session_is_benign() {
        let (registry, _) = registry();
        assert_eq!(registry.end("tab-missing"), EndOutcome::NoActiveSession);

        registry.begin("tab-1", "stream-abc").unwrap();
        assert!(matches!(registry.end("tab-1"), EndOutcome::Ended(_)));
        assert_eq!(registry.end("tab-1"), EndOutcome::NoActiveSession);
    }

    #[test]
    fn test_begin_after_end_creates_fresh_session() {
        let (registry, clock) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();
        registry.append_transcript("tab-1", "old text", false);
        registry.end("tab-1");

        clock.advance(chrono::Duration::seconds(1));
        let fresh = registry.begin("tab-1", "stream-def").unwrap();

        assert_eq!(fresh.stream_id, "stream-def");
        assert!(fresh.transcript_buffer.is_empty());
        assert_eq!(fresh.audio_chunk_count, 0);
    }

    #[test]
    fn test_final_transcript_overwrites_partial() {
        let (registry, _) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();

        assert!(registry.append_transcript("tab-1", "partial", true));
        assert!(registry.append_transcript("tab-1", "final", false));

        assert_eq!(registry.get("tab-1").unwrap().transcript_buffer, "final");
    }

    #[test]
    fn test_partials_overwrite_each_other() {
        let (registry, _) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();

        registry.append_transcript("tab-1", "hel", true);
        registry.append_transcript("tab-1", "hello wor", true);

        assert_eq!(registry.get("tab-1").unwrap().transcript_buffer, "hello wor");
    }

    #[test]
    fn test_audio_chunk_for_absent_tab_is_dropped() {
        let (registry, _) = registry();
        assert_eq!(registry.append_audio_chunk("tab-1", 128), None);
        assert!(!registry.append_transcript("tab-1", "late", false));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_audio_chunks_are_counted() {
        let (registry, _) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();

        assert_eq!(registry.append_audio_chunk("tab-1", 100), Some(1));
        assert_eq!(registry.append_audio_chunk("tab-1", 50), Some(2));

        let session = registry.get("tab-1").unwrap();
        assert_eq!(session.audio_chunk_count, 2);
        assert_eq!(session.audio_bytes, 150);
    }

    #[test]
    fn test_stopping_session_still_blocks_begin() {
        let (registry, _) = registry();
        registry.begin("tab-1", "stream-abc").unwrap();

        let stopping = registry.mark_stopping("tab-1").unwrap();
        assert_eq!(stopping.status, SessionStatus::Stopping);
        assert!(registry.begin("tab-1", "stream-def").is_err());

        assert!(registry.mark_stopping("tab-2").is_none());
    }

    #[test]
    fn test_sessions_are_isolated_per_tab() {
        let (registry, _) = registry();
        registry.begin("tab-2", "stream-b").unwrap();
        registry.begin("tab-1", "stream-a").unwrap();
        registry.append_transcript("tab-1", "only tab one", false);

        assert_eq!(registry.active_tabs(), vec!["tab-1", "tab-2"]);
        assert!(registry.get("tab-2").unwrap().transcript_buffer.is_empty());
    }
}
