use serde::{Deserialize, Serialize};

use super::session::RecordingSession;

/// Final snapshot handed to whoever ends a session
///
/// The registry drops the session once this is produced; persisting it is
/// the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: RecordingSession,

    /// `end_time - start_time` in milliseconds
    pub duration_ms: i64,
}

/// Result of [`SessionRegistry::end`](super::SessionRegistry::end)
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    Ended(SessionSummary),
    /// Nothing was recording; duplicate stops land here
    NoActiveSession,
}
