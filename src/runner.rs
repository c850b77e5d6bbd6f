use std::process::{ExitCode, Termination};
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

use crate::error::SessionError;
use crate::sdk::{Credential, JoinRequest};
use crate::session::SessionMachine;

/// Process exit status, one code per failure point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The meeting ended normally or the operator interrupted it
    Success = 0,
    /// Missing or invalid parameters; no SDK call was made
    InvalidParameters = 1,
    /// SDK initialization or authentication failed
    AuthFailed = 2,
    /// The join failed, including audio subscription
    JoinFailed = 3,
    /// The meeting ended with an error after a successful join
    MeetingError = 4,
}

impl ExitStatus {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// Main run loop: initialize, join, wait, then always release
pub struct SessionRunner {
    machine: Arc<SessionMachine>,
}

impl SessionRunner {
    pub fn new(machine: Arc<SessionMachine>) -> Self {
        Self { machine }
    }

    pub fn run(&self, credential: &Credential, request: &JoinRequest) -> ExitStatus {
        let span = info_span!("session", id = %self.machine.session_id());
        let _enter = span.enter();

        let mut status = self.drive(credential, request);

        if let Some(report) = self.machine.join_pipeline() {
            if let Some(err) = &report.error {
                error!("Audio stream ended with an error: {}", err);
                if status == ExitStatus::Success {
                    status = ExitStatus::MeetingError;
                }
            }
        }

        self.machine.shutdown();

        info!("Session finished with exit status {:?}", status);
        status
    }

    fn drive(&self, credential: &Credential, request: &JoinRequest) -> ExitStatus {
        if let Err(e) = self.machine.initialize(credential) {
            return match e {
                SessionError::Interrupted => {
                    info!("Interrupted before authentication completed");
                    ExitStatus::Success
                }
                e => {
                    error!("Initialization failed: {}", e);
                    ExitStatus::AuthFailed
                }
            };
        }

        if let Err(e) = self.machine.join(request) {
            return match e {
                SessionError::Interrupted => {
                    info!("Interrupted before the join completed");
                    ExitStatus::Success
                }
                SessionError::InvalidParameters(message) => {
                    error!("Invalid join parameters: {}", message);
                    ExitStatus::InvalidParameters
                }
                e => {
                    error!("Join failed: {}", e);
                    ExitStatus::JoinFailed
                }
            };
        }

        let state = self.machine.wait_until_finished();
        info!("Session no longer active (state: {})", state);

        match self.machine.failure() {
            Some(e) => {
                warn!("Meeting ended with an error: {}", e);
                ExitStatus::MeetingError
            }
            None => ExitStatus::Success,
        }
    }
}
