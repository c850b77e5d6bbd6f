use std::fmt;
use std::sync::Weak;
use thiserror::Error;

/// Opaque credential handed to the SDK (typically a signed JWT)
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// Never print the token itself
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes redacted>)", self.0.len())
    }
}

/// Parameters for a single meeting join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub meeting_id: String,
    pub password: String,
    /// Sample rate in Hz negotiated for the raw audio feed
    pub sample_rate: u32,
    /// 1 = mono, 2 = stereo
    pub channels: u16,
}

/// Meeting status reported by the SDK
///
/// Codes follow the vendor enumeration order (0 = idle, 3 = in meeting).
/// Codes this crate does not know about are carried as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingStatus {
    Idle,
    Connecting,
    WaitingForHost,
    InMeeting,
    Disconnecting,
    Reconnecting,
    Unknown(i32),
}

impl MeetingStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => MeetingStatus::Idle,
            1 => MeetingStatus::Connecting,
            2 => MeetingStatus::WaitingForHost,
            3 => MeetingStatus::InMeeting,
            4 => MeetingStatus::Disconnecting,
            5 => MeetingStatus::Reconnecting,
            other => MeetingStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            MeetingStatus::Idle => 0,
            MeetingStatus::Connecting => 1,
            MeetingStatus::WaitingForHost => 2,
            MeetingStatus::InMeeting => 3,
            MeetingStatus::Disconnecting => 4,
            MeetingStatus::Reconnecting => 5,
            MeetingStatus::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeetingStatus::Unknown(code) => write!(f, "Unknown({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Error code attached to a meeting status callback (0 = success)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeetingErrorCode(pub i32);

impl MeetingErrorCode {
    pub const SUCCESS: MeetingErrorCode = MeetingErrorCode(0);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MeetingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            write!(f, "success")
        } else {
            write!(f, "code {}", self.0)
        }
    }
}

/// Outcome of an authentication request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    Failure(String),
}

/// Synchronous error returned by an SDK call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct SdkError {
    pub operation: &'static str,
    pub message: String,
}

impl SdkError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Receiver for the SDK's asynchronous events
///
/// Implementations must tolerate being called from any thread, including
/// inline from inside the adapter call that triggered the event.
pub trait AdapterListener: Send + Sync {
    fn on_auth_result(&self, result: AuthResult);

    fn on_meeting_status_changed(&self, status: MeetingStatus, error: MeetingErrorCode);
}

/// Conferencing SDK capability
///
/// `authenticate` and `join_meeting` only issue the request: their outcome
/// arrives later through the registered [`AdapterListener`].
///
/// `subscribe_audio` and `unsubscribe_audio` are called while the session
/// lock is held. They must return promptly and must not call back into the
/// listener.
pub trait MeetingAdapter: Send + Sync {
    /// Register the listener for asynchronous events
    fn set_listener(&self, listener: Weak<dyn AdapterListener>);

    fn initialize(&self, credential: &Credential) -> Result<(), SdkError>;

    fn authenticate(&self, credential: &Credential) -> Result<(), SdkError>;

    fn join_meeting(&self, request: &JoinRequest) -> Result<(), SdkError>;

    fn leave_meeting(&self) -> Result<(), SdkError>;

    fn subscribe_audio(&self) -> Result<(), SdkError>;

    fn unsubscribe_audio(&self) -> Result<(), SdkError>;

    /// Release every handle held by the SDK
    fn cleanup(&self);

    /// Adapter name for logging
    fn name(&self) -> &str;
}
