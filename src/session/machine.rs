// Session lifecycle state machine
//
// All session fields live behind one mutex. A condition variable is notified
// after every transition so the synchronous facades (initialize, join, the
// run loop's final wait) wake as soon as the SDK callback they depend on has
// been processed.
//
// Adapter calls that may call back into the listener are made with the lock
// released; subscribe/unsubscribe are made under it (see MeetingAdapter).
// The producer thread never takes the lock: it reads the atomic mirrors of
// `in_meeting` and `audio_subscribed` kept in `Shared`.

use anyhow::bail;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{Session, SessionState};
use super::stats::SessionStats;
use crate::audio::{
    AudioPipeline, AudioSink, AudioSource, PipelineConfig, PipelineHandle, PipelineReport,
    StreamControl,
};
use crate::error::SessionError;
use crate::sdk::{
    AdapterListener, AuthResult, Credential, JoinRequest, MeetingAdapter, MeetingErrorCode,
    MeetingStatus,
};
use crate::shutdown::TerminationSignal;

/// Check join parameters before anything is sent to the SDK
pub fn validate_join_request(request: &JoinRequest) -> Result<(), SessionError> {
    if request.meeting_id.trim().is_empty() {
        return Err(SessionError::InvalidParameters("meeting id is empty".to_string()));
    }
    if request.sample_rate == 0 {
        return Err(SessionError::InvalidParameters(
            "sample rate must be greater than 0".to_string(),
        ));
    }
    if !matches!(request.channels, 1 | 2) {
        return Err(SessionError::InvalidParameters(format!(
            "channels must be 1 or 2, got {}",
            request.channels
        )));
    }
    Ok(())
}

/// State shared with the producer thread and the shutdown path
pub(crate) struct Shared {
    session: Mutex<Session>,
    changed: Condvar,
    termination: TerminationSignal,
    in_meeting: AtomicBool,
    audio_active: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh the lock-free mirrors read by the pipeline
    fn publish(&self, session: &Session) {
        self.in_meeting.store(session.in_meeting, Ordering::SeqCst);
        self.audio_active.store(session.audio_subscribed, Ordering::SeqCst);
    }

    fn request_stop(&self, reason: &str) {
        {
            let mut session = self.lock();
            self.stop_locked(&mut session, reason);
        }
        self.changed.notify_all();
    }

    /// Raise termination and mark the session stop-requested; the caller
    /// notifies waiters once the lock is released
    fn stop_locked(&self, session: &mut Session, reason: &str) {
        session.stop_requested = true;
        if self.termination.raise() {
            info!("Stop requested: {}", reason);
        } else {
            debug!("Stop requested again: {}", reason);
        }
    }
}

impl StreamControl for Shared {
    fn should_stream(&self) -> bool {
        self.in_meeting.load(Ordering::SeqCst)
            && self.audio_active.load(Ordering::SeqCst)
            && !self.termination.is_raised()
    }

    fn request_stop(&self, reason: &str) {
        Shared::request_stop(self, reason)
    }
}

/// Cancellation handle for the session
///
/// Only raises the termination flag, marks the session stop-requested and
/// wakes waiters. It never calls into the SDK, so it is safe to use from the
/// signal listener.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn request_stop(&self, reason: &str) {
        self.shared.request_stop(reason)
    }

    pub fn termination(&self) -> &TerminationSignal {
        &self.shared.termination
    }
}

struct AudioIo {
    source: Box<dyn AudioSource>,
    sink: Box<dyn AudioSink>,
}

/// Drives one conferencing session through its lifecycle
pub struct SessionMachine {
    config: SessionConfig,
    adapter: Arc<dyn MeetingAdapter>,
    shared: Arc<Shared>,
    /// Consumed when the producer thread starts
    audio: Mutex<Option<AudioIo>>,
    pipeline: Mutex<Option<PipelineHandle>>,
    report: Mutex<Option<PipelineReport>>,
    created_at: DateTime<Utc>,
}

impl SessionMachine {
    /// Create the session and register it as the adapter's listener
    pub fn new(
        adapter: Arc<dyn MeetingAdapter>,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        termination: TerminationSignal,
        config: SessionConfig,
    ) -> Arc<Self> {
        info!("Creating session {} (adapter: {})", config.session_id, adapter.name());

        let machine = Arc::new(Self {
            config,
            adapter,
            shared: Arc::new(Shared {
                session: Mutex::new(Session::new()),
                changed: Condvar::new(),
                termination,
                in_meeting: AtomicBool::new(false),
                audio_active: AtomicBool::new(false),
            }),
            audio: Mutex::new(Some(AudioIo { source, sink })),
            pipeline: Mutex::new(None),
            report: Mutex::new(None),
            created_at: Utc::now(),
        });

        let listener: Arc<dyn AdapterListener> = machine.clone();
        machine.adapter.set_listener(Arc::downgrade(&listener));

        machine
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn termination(&self) -> &TerminationSignal {
        &self.shared.termination
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Copy of the current session fields
    pub fn snapshot(&self) -> Session {
        self.shared.lock().clone()
    }

    pub fn failure(&self) -> Option<SessionError> {
        self.shared.lock().failure.clone()
    }

    /// Initialize the SDK and authenticate, blocking until the SDK reports
    /// the outcome
    pub fn initialize(&self, credential: &Credential) -> Result<(), SessionError> {
        {
            let mut session = self.shared.lock();
            let state = session.state;
            match state {
                SessionState::Uninitialized => {}
                SessionState::Authenticating => {
                    drop(session);
                    return self.wait_for_auth();
                }
                _ if session.authenticated => return Ok(()),
                other => {
                    return Err(session
                        .failure
                        .clone()
                        .unwrap_or(SessionError::InvalidState(other.name())))
                }
            }

            if self.shared.termination.is_raised() {
                return Err(SessionError::Interrupted);
            }
            self.transition(&mut session, SessionState::Authenticating);
        }
        self.shared.changed.notify_all();

        info!("Initializing {} SDK", self.adapter.name());
        if let Err(e) = self.adapter.initialize(credential) {
            error!("SDK initialization failed: {}", e);
            let err = SessionError::InitializationFailed(e);
            self.fail(err.clone());
            return Err(err);
        }
        self.shared.lock().sdk_ready = true;

        info!("Authenticating with the SDK");
        if let Err(e) = self.adapter.authenticate(credential) {
            error!("Authentication request failed: {}", e);
            let err = SessionError::AuthenticationFailed(e.to_string());
            self.fail(err.clone());
            return Err(err);
        }

        self.wait_for_auth()
    }

    fn wait_for_auth(&self) -> Result<(), SessionError> {
        let session = self.wait_while(|s| s.state == SessionState::Authenticating)?;

        if session.authenticated {
            Ok(())
        } else {
            Err(session.failure.clone().unwrap_or_else(|| {
                SessionError::AuthenticationFailed(format!("session ended in {}", session.state))
            }))
        }
    }

    /// Join a meeting, blocking until the SDK reports the outcome
    ///
    /// Succeeds only once the session is in the meeting with audio
    /// subscribed and the producer thread running.
    pub fn join(&self, request: &JoinRequest) -> Result<(), SessionError> {
        {
            let mut session = self.shared.lock();
            let state = session.state;
            match state {
                SessionState::Authenticated => {}
                _ if !session.authenticated => return Err(SessionError::NotAuthenticated),
                other => return Err(SessionError::InvalidState(other.name())),
            }

            validate_join_request(request)?;

            if self.shared.termination.is_raised() {
                return Err(SessionError::Interrupted);
            }

            session.meeting_id = request.meeting_id.clone();
            session.sample_rate = request.sample_rate;
            session.channels = request.channels;
            // Joining before the call: the SDK may answer inline
            self.transition(&mut session, SessionState::Joining);
        }
        self.shared.changed.notify_all();

        info!(
            "Joining meeting {} ({}Hz, {} channels)",
            request.meeting_id, request.sample_rate, request.channels
        );
        if let Err(e) = self.adapter.join_meeting(request) {
            error!("Join request failed: {}", e);
            let err = SessionError::JoinFailed(e.to_string());
            self.fail(err.clone());
            return Err(err);
        }

        let session = self.wait_while(|s| s.state == SessionState::Joining)?;

        if session.state == SessionState::InMeeting
            && session.audio_subscribed
            && session.failure.is_none()
        {
            info!("Joined meeting {}", session.meeting_id);
            Ok(())
        } else {
            Err(session.failure.clone().unwrap_or_else(|| {
                SessionError::JoinFailed(format!("session ended in {}", session.state))
            }))
        }
    }

    /// Leave the meeting
    ///
    /// No-op unless the session is in the meeting, so repeated calls reach
    /// the SDK once.
    pub fn leave(&self) {
        {
            let mut session = self.shared.lock();
            if session.state != SessionState::InMeeting {
                debug!("leave() ignored in state {}", session.state);
                return;
            }

            self.release_audio(&mut session);
            self.transition(&mut session, SessionState::Leaving);
        }
        self.shared.changed.notify_all();

        info!("Leaving meeting");
        if let Err(e) = self.adapter.leave_meeting() {
            warn!("SDK leave failed: {}", e);
        }

        // The SDK confirms asynchronously; don't wait for it
        self.on_meeting_status_changed(MeetingStatus::Idle, MeetingErrorCode::SUCCESS);
    }

    /// Leave if needed, release the SDK and terminate the session
    ///
    /// Runs once; later calls return immediately.
    pub fn shutdown(&self) {
        {
            let mut session = self.shared.lock();
            if session.released {
                debug!("shutdown() already ran");
                return;
            }
            session.released = true;
        }

        info!("Shutting down session {}", self.config.session_id);
        self.leave();
        self.join_pipeline();

        {
            let mut session = self.shared.lock();
            self.release_audio(&mut session);
            session.stop_requested = true;
        }

        self.adapter.cleanup();

        // Callbacks drained by cleanup may have touched the pipeline slot
        self.join_pipeline();

        {
            let mut session = self.shared.lock();
            session.sdk_ready = false;
            if session.state != SessionState::Terminated {
                self.transition(&mut session, SessionState::Terminated);
            }
        }
        self.shared.changed.notify_all();

        info!("Session {} released", self.config.session_id);
    }

    /// Block until the session is over: termination requested, a terminal
    /// state reached, or the meeting was never entered
    pub fn wait_until_finished(&self) -> SessionState {
        let session = self.shared.lock();
        let session = self
            .shared
            .changed
            .wait_while(session, |s| {
                !(self.shared.termination.is_raised()
                    || s.stop_requested
                    || s.state.is_terminal()
                    || !s.has_been(SessionState::InMeeting))
            })
            .unwrap_or_else(PoisonError::into_inner);

        session.state
    }

    /// Wait for the producer thread to exit, if one was started
    pub fn join_pipeline(&self) -> Option<PipelineReport> {
        let handle = self
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            let report = handle.join();
            *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
        }

        self.pipeline_report()
    }

    pub fn pipeline_report(&self) -> Option<PipelineReport> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> SessionStats {
        let session = self.snapshot();
        let report = self.pipeline_report().unwrap_or_default();
        let duration = Utc::now().signed_duration_since(self.created_at);

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: session.state,
            meeting_id: session.meeting_id.clone(),
            started_at: self.created_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_forwarded: report.chunks_forwarded,
            bytes_forwarded: report.bytes_forwarded,
            failure: session.failure.as_ref().map(|e| e.to_string()),
            transitions: session.history,
        }
    }

    fn transition(&self, session: &mut Session, next: SessionState) -> bool {
        let applied = session.apply(next);
        self.shared.publish(session);
        applied
    }

    /// Record a fatal error, move to Failed and request termination
    fn fail_locked(&self, session: &mut Session, err: SessionError) {
        error!("Session failed: {}", err);
        if !session.state.is_terminal() {
            self.transition(session, SessionState::Failed);
        }
        let reason = err.to_string();
        if session.failure.is_none() {
            session.failure = Some(err);
        }
        self.shared.stop_locked(session, &reason);
    }

    fn fail(&self, err: SessionError) {
        {
            let mut session = self.shared.lock();
            self.fail_locked(&mut session, err);
        }
        self.shared.changed.notify_all();
    }

    fn release_audio(&self, session: &mut Session) {
        if !session.audio_subscribed {
            return;
        }

        if let Err(e) = self.adapter.unsubscribe_audio() {
            warn!("Audio unsubscribe failed: {}", e);
        }
        session.audio_subscribed = false;
        self.shared.publish(session);
    }

    /// Wait on the condition variable while `pending` holds
    ///
    /// Gives up early when termination is requested, and fails the session
    /// if the SDK stays silent past the callback timeout.
    fn wait_while<F>(&self, mut pending: F) -> Result<MutexGuard<'_, Session>, SessionError>
    where
        F: FnMut(&Session) -> bool,
    {
        let timeout = self.config.callback_timeout;
        let session = self.shared.lock();
        let (mut session, result) = self
            .shared
            .changed
            .wait_timeout_while(session, timeout, |s| {
                pending(s) && !self.shared.termination.is_raised()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if !pending(&session) {
            return Ok(session);
        }

        if result.timed_out() {
            let err = SessionError::CallbackTimeout(timeout);
            self.fail_locked(&mut session, err.clone());
            drop(session);
            self.shared.changed.notify_all();
            return Err(err);
        }

        Err(SessionError::Interrupted)
    }

    fn start_pipeline(&self, session: &Session) -> anyhow::Result<()> {
        if session.released {
            bail!("session is shutting down");
        }

        let mut slot = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Audio pipeline already running");
            return Ok(());
        }

        let Some(io) = self.audio.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            bail!("audio source and sink were already used by an earlier meeting");
        };

        let control: Arc<dyn StreamControl> = self.shared.clone();
        let pipeline = AudioPipeline::new(
            PipelineConfig::new(session.sample_rate, session.channels),
            io.source,
            io.sink,
            control,
        );

        *slot = Some(pipeline.spawn()?);
        Ok(())
    }

    /// Handle InMeeting + success while joining: subscribe, then stream
    ///
    /// Returns true when the session must leave immediately.
    fn enter_meeting(&self, session: &mut Session) -> bool {
        // InMeeting before subscribing so leave() applies on every early exit
        self.transition(session, SessionState::InMeeting);

        if self.shared.termination.is_raised() || session.stop_requested || session.released {
            info!("Join completed after a stop was requested, leaving without subscribing");
            return true;
        }

        if let Err(e) = self.adapter.subscribe_audio() {
            error!("Audio subscription failed: {}", e);
            let err = SessionError::SubscribeFailed(e);
            let reason = err.to_string();
            session.failure.get_or_insert(err);
            self.shared.stop_locked(session, &reason);
            return true;
        }

        session.audio_subscribed = true;
        self.shared.publish(session);
        info!("Subscribed to meeting audio");

        if let Err(e) = self.start_pipeline(session) {
            error!("Failed to start audio pipeline: {:#}", e);
            let err = SessionError::JoinFailed(format!("audio pipeline: {:#}", e));
            let reason = err.to_string();
            session.failure.get_or_insert(err);
            self.shared.stop_locked(session, &reason);
            return true;
        }

        false
    }
}

impl AdapterListener for SessionMachine {
    fn on_auth_result(&self, result: AuthResult) {
        {
            let mut session = self.shared.lock();
            if session.state != SessionState::Authenticating {
                warn!("Ignoring auth result {:?} in state {}", result, session.state);
            } else {
                match result {
                    AuthResult::Success => {
                        info!("Authentication succeeded");
                        self.transition(&mut session, SessionState::Authenticated);
                    }
                    AuthResult::Failure(reason) => {
                        self.fail_locked(&mut session, SessionError::AuthenticationFailed(reason));
                    }
                }
            }
        }
        self.shared.changed.notify_all();
    }

    fn on_meeting_status_changed(&self, status: MeetingStatus, error: MeetingErrorCode) {
        let mut leave_now = false;
        {
            let mut session = self.shared.lock();
            info!(
                "Meeting status: {} ({}) while {}",
                status, error, session.state
            );

            match status {
                MeetingStatus::InMeeting if error.is_success() => {
                    if session.state == SessionState::Joining {
                        leave_now = self.enter_meeting(&mut session);
                    } else {
                        debug!("Ignoring InMeeting in state {}", session.state);
                    }
                }
                MeetingStatus::InMeeting => {
                    self.fail_locked(&mut session, SessionError::MeetingFailed { status, code: error });
                }
                MeetingStatus::Idle
                    if matches!(session.state, SessionState::InMeeting | SessionState::Leaving) =>
                {
                    self.release_audio(&mut session);
                    if !error.is_success() {
                        warn!("Meeting ended with {}", error);
                        session
                            .failure
                            .get_or_insert(SessionError::MeetingFailed { status, code: error });
                    }
                    self.transition(&mut session, SessionState::Terminated);
                }
                MeetingStatus::Idle if session.state == SessionState::Joining => {
                    let err = if error.is_success() {
                        SessionError::JoinFailed("meeting went idle before the join completed".to_string())
                    } else {
                        SessionError::MeetingFailed { status, code: error }
                    };
                    self.fail_locked(&mut session, err);
                }
                _ if !error.is_success() => {
                    if session.state.is_terminal() {
                        debug!("Ignoring {} ({}) after the session ended", status, error);
                    } else {
                        self.fail_locked(&mut session, SessionError::MeetingFailed { status, code: error });
                    }
                }
                MeetingStatus::Unknown(code) => {
                    warn!("Unknown meeting status code {}", code);
                }
                _ => {}
            }
        }
        self.shared.changed.notify_all();

        if leave_now {
            self.leave();
        }
    }
}
