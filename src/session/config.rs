use std::time::Duration;

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier used in logs
    pub session_id: String,

    /// How long initialize() and join() wait for the SDK's callback
    /// Default: 30 seconds
    pub callback_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            callback_timeout: Duration::from_secs(30),
        }
    }
}
