// Simulated conferencing SDK
//
// Deterministic stand-in for a vendor SDK. It honours the same contract as a
// real adapter (results arrive through the listener, either inline or from
// SDK-owned threads) and counts every capability call so callers can verify
// how the session drove it.

use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::adapter::{
    AdapterListener, AuthResult, Credential, JoinRequest, MeetingAdapter, MeetingErrorCode,
    MeetingStatus, SdkError,
};

/// How the simulated SDK delivers its callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackMode {
    /// Fire the callback before the triggering call returns
    Inline,
    /// Fire the callback from a separate SDK thread after `callback_delay_ms`
    Threaded,
}

/// Behaviour of the simulated SDK
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fail `initialize` synchronously
    pub fail_initialize: bool,
    /// Report an authentication failure regardless of the credential
    pub reject_auth: bool,
    /// Report this error code instead of joining
    pub join_error: Option<i32>,
    /// Fail `subscribe_audio`
    pub fail_subscribe: bool,
    pub callback_mode: CallbackMode,
    pub callback_delay_ms: u64,
    /// The host ends the meeting after this long (None = never)
    pub meeting_duration_ms: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fail_initialize: false,
            reject_auth: false,
            join_error: None,
            fail_subscribe: false,
            callback_mode: CallbackMode::Threaded,
            callback_delay_ms: 20,
            meeting_duration_ms: None,
        }
    }
}

/// Snapshot of how many times each capability was invoked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub initialize: usize,
    pub authenticate: usize,
    pub join: usize,
    pub leave: usize,
    pub subscribe: usize,
    pub unsubscribe: usize,
    pub cleanup: usize,
}

#[derive(Default)]
struct CallCounters {
    initialize: AtomicUsize,
    authenticate: AtomicUsize,
    join: AtomicUsize,
    leave: AtomicUsize,
    subscribe: AtomicUsize,
    unsubscribe: AtomicUsize,
    cleanup: AtomicUsize,
}

type Listener = Weak<dyn AdapterListener>;

pub struct SimulatedAdapter {
    config: SimulationConfig,
    listener: Mutex<Option<Listener>>,
    calls: CallCounters,
    /// SDK-owned callback threads, joined on cleanup
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Dropping the sender cancels the "host ends meeting" timer
    host_timer: Mutex<Option<Sender<()>>>,
}

impl SimulatedAdapter {
    pub fn new(config: SimulationConfig) -> Self {
        info!(
            "Simulated SDK created (callbacks: {:?}, delay: {}ms)",
            config.callback_mode, config.callback_delay_ms
        );

        Self {
            config,
            listener: Mutex::new(None),
            calls: CallCounters::default(),
            workers: Mutex::new(Vec::new()),
            host_timer: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.calls;
        CallCounts {
            initialize: c.initialize.load(Ordering::SeqCst),
            authenticate: c.authenticate.load(Ordering::SeqCst),
            join: c.join.load(Ordering::SeqCst),
            leave: c.leave.load(Ordering::SeqCst),
            subscribe: c.subscribe.load(Ordering::SeqCst),
            unsubscribe: c.unsubscribe.load(Ordering::SeqCst),
            cleanup: c.cleanup.load(Ordering::SeqCst),
        }
    }

    fn listener(&self) -> Option<Listener> {
        self.listener.lock().ok().and_then(|guard| guard.clone())
    }

    /// Deliver an event to the listener according to the callback mode
    fn deliver<F>(&self, operation: &'static str, event: F) -> Result<(), SdkError>
    where
        F: FnOnce(&dyn AdapterListener) + Send + 'static,
    {
        let Some(listener) = self.listener() else {
            warn!("{}: no listener registered, dropping callback", operation);
            return Ok(());
        };

        match self.config.callback_mode {
            CallbackMode::Inline => {
                if let Some(listener) = listener.upgrade() {
                    event(listener.as_ref());
                }
                Ok(())
            }
            CallbackMode::Threaded => {
                let delay = Duration::from_millis(self.config.callback_delay_ms);
                self.spawn_worker(operation, move || {
                    thread::sleep(delay);
                    if let Some(listener) = listener.upgrade() {
                        event(listener.as_ref());
                    }
                })
            }
        }
    }

    fn spawn_worker<F>(&self, operation: &'static str, work: F) -> Result<(), SdkError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("sdk-{}", operation))
            .spawn(work)
            .map_err(|e| SdkError::new(operation, format!("failed to spawn SDK thread: {}", e)))?;

        if let Ok(mut workers) = self.workers.lock() {
            workers.push(handle);
        }
        Ok(())
    }

    /// Start the timer after which the host ends the meeting
    fn start_host_timer(&self, duration: Duration) -> Result<(), SdkError> {
        let Some(listener) = self.listener() else {
            return Ok(());
        };

        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        if let Ok(mut timer) = self.host_timer.lock() {
            *timer = Some(cancel_tx);
        }

        self.spawn_worker("host-timer", move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(duration) {
                info!("Simulated host ended the meeting after {:?}", duration);
                if let Some(listener) = listener.upgrade() {
                    listener.on_meeting_status_changed(MeetingStatus::Idle, MeetingErrorCode::SUCCESS);
                }
            }
        })
    }

    fn cancel_host_timer(&self) {
        if let Ok(mut timer) = self.host_timer.lock() {
            timer.take();
        }
    }
}

impl MeetingAdapter for SimulatedAdapter {
    fn set_listener(&self, listener: Weak<dyn AdapterListener>) {
        if let Ok(mut guard) = self.listener.lock() {
            *guard = Some(listener);
        }
    }

    fn initialize(&self, _credential: &Credential) -> Result<(), SdkError> {
        self.calls.initialize.fetch_add(1, Ordering::SeqCst);

        if self.config.fail_initialize {
            return Err(SdkError::new("initialize", "simulated SDK refused to start"));
        }

        debug!("Simulated SDK initialized");
        Ok(())
    }

    fn authenticate(&self, credential: &Credential) -> Result<(), SdkError> {
        self.calls.authenticate.fetch_add(1, Ordering::SeqCst);

        let result = if credential.is_empty() {
            AuthResult::Failure("empty credential".to_string())
        } else if self.config.reject_auth {
            AuthResult::Failure("credential rejected".to_string())
        } else {
            AuthResult::Success
        };

        self.deliver("authenticate", move |listener| listener.on_auth_result(result))
    }

    fn join_meeting(&self, request: &JoinRequest) -> Result<(), SdkError> {
        self.calls.join.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated join for meeting {}", request.meeting_id);

        let outcome = match self.config.join_error {
            Some(code) => MeetingErrorCode(code),
            None => MeetingErrorCode::SUCCESS,
        };

        self.deliver("join", move |listener| {
            listener.on_meeting_status_changed(MeetingStatus::Connecting, MeetingErrorCode::SUCCESS);
            listener.on_meeting_status_changed(MeetingStatus::InMeeting, outcome);
        })?;

        if let (None, Some(ms)) = (self.config.join_error, self.config.meeting_duration_ms) {
            self.start_host_timer(Duration::from_millis(ms))?;
        }

        Ok(())
    }

    fn leave_meeting(&self) -> Result<(), SdkError> {
        self.calls.leave.fetch_add(1, Ordering::SeqCst);
        self.cancel_host_timer();

        // The SDK confirms the leave asynchronously
        self.deliver("leave", |listener| {
            listener.on_meeting_status_changed(MeetingStatus::Idle, MeetingErrorCode::SUCCESS);
        })
    }

    fn subscribe_audio(&self) -> Result<(), SdkError> {
        self.calls.subscribe.fetch_add(1, Ordering::SeqCst);

        if self.config.fail_subscribe {
            return Err(SdkError::new("subscribe_audio", "raw audio access denied"));
        }
        Ok(())
    }

    fn unsubscribe_audio(&self) -> Result<(), SdkError> {
        self.calls.unsubscribe.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cleanup(&self) {
        self.calls.cleanup.fetch_add(1, Ordering::SeqCst);
        self.cancel_host_timer();

        // A callback still in flight may spawn another worker, so drain until empty
        loop {
            let workers = match self.workers.lock() {
                Ok(mut workers) => std::mem::take(&mut *workers),
                Err(_) => Vec::new(),
            };
            if workers.is_empty() {
                break;
            }

            for worker in workers {
                if worker.join().is_err() {
                    warn!("Simulated SDK thread panicked");
                }
            }
        }

        debug!("Simulated SDK cleaned up");
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
