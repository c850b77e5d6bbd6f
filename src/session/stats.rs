use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionState;

/// Summary of a session, logged when the process exits
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    pub meeting_id: String,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of audio chunks handed to the sink
    pub chunks_forwarded: u64,

    pub bytes_forwarded: u64,

    /// The error that ended the session, if any
    pub failure: Option<String>,

    pub transitions: Vec<SessionState>,
}
