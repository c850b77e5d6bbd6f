use std::time::Duration;
use thiserror::Error;

use crate::sdk::{MeetingErrorCode, MeetingStatus, SdkError};

/// Errors reported by session operations
///
/// Every variant is local to the session: the state machine converts the
/// failure into a transition plus a termination request before returning it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid parameter: {0}")]
    InvalidParameters(String),

    #[error("SDK initialization failed: {0}")]
    InitializationFailed(SdkError),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("operation not valid in state {0}")]
    InvalidState(&'static str),

    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("meeting reported {status} with error {code}")]
    MeetingFailed {
        status: MeetingStatus,
        code: MeetingErrorCode,
    },

    #[error("audio subscription failed: {0}")]
    SubscribeFailed(SdkError),

    #[error("no callback from the SDK within {0:?}")]
    CallbackTimeout(Duration),

    #[error("interrupted by shutdown request")]
    Interrupted,
}
