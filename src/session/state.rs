use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::error::SessionError;

/// Lifecycle of the single conferencing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Authenticated,
    Joining,
    InMeeting,
    Leaving,
    Terminated,
    Failed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Authenticating => "Authenticating",
            SessionState::Authenticated => "Authenticated",
            SessionState::Joining => "Joining",
            SessionState::InMeeting => "InMeeting",
            SessionState::Leaving => "Leaving",
            SessionState::Terminated => "Terminated",
            SessionState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    ///
    /// `Failed` only moves on to `Terminated`, when resources are released.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (Uninitialized, Authenticating)
            | (Authenticating, Authenticated)
            | (Authenticated, Joining)
            | (Joining, InMeeting)
            | (InMeeting, Leaving) => true,
            (Failed, Terminated) => true,
            (Terminated, _) | (Failed, _) => false,
            (_, Failed) | (_, Terminated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The session's mutable fields
///
/// Only the state machine writes these, always under the session lock.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) state: SessionState,
    pub(crate) sdk_ready: bool,
    pub(crate) authenticated: bool,
    pub(crate) in_meeting: bool,
    pub(crate) stop_requested: bool,
    pub(crate) audio_subscribed: bool,
    pub(crate) meeting_id: String,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
    /// First fatal error, kept after the session terminates
    pub(crate) failure: Option<SessionError>,
    pub(crate) history: Vec<SessionState>,
    /// shutdown() has run
    pub(crate) released: bool,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            sdk_ready: false,
            authenticated: false,
            in_meeting: false,
            stop_requested: false,
            audio_subscribed: false,
            meeting_id: String::new(),
            sample_rate: 0,
            channels: 0,
            failure: None,
            history: vec![SessionState::Uninitialized],
            released: false,
        }
    }

    /// Move to `next`, keeping the derived flags consistent
    pub(crate) fn apply(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!("Rejected session transition {} -> {}", self.state, next);
            return false;
        }

        info!("Session state: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);

        match next {
            SessionState::Authenticated => self.authenticated = true,
            SessionState::InMeeting => self.in_meeting = true,
            SessionState::Leaving | SessionState::Terminated | SessionState::Failed => {
                self.in_meeting = false
            }
            _ => {}
        }

        debug_assert!(!self.in_meeting || self.authenticated);
        true
    }

    pub(crate) fn has_been(&self, state: SessionState) -> bool {
        self.history.contains(&state)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sdk_ready(&self) -> bool {
        self.sdk_ready
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn in_meeting(&self) -> bool {
        self.in_meeting
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn audio_subscribed(&self) -> bool {
        self.audio_subscribed
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    /// Every state the session has been in, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }
}
