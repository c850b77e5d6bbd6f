// Shutdown coordination
//
// Signals funnel into one idempotent request: raise the termination flag,
// mark the session stop-requested and wake every waiter. Internal fatal
// errors take the same path from inside the state machine. The blocking
// part (leaving the meeting, releasing the SDK) is left to the run loop's
// call to SessionMachine::shutdown.
//
// Signals are received through tokio's signal driver on a dedicated thread,
// so the handler runs as ordinary code rather than in signal context.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::session::StopHandle;

/// Process-wide "stop as soon as safely possible" flag
///
/// Monotonic: once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal(Arc<AtomicBool>);

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag, returning true for the call that actually raised it
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a shutdown was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt signal"),
            ShutdownReason::Terminate => write!(f, "termination signal"),
        }
    }
}

pub struct ShutdownCoordinator {
    stop: StopHandle,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(stop: StopHandle) -> Arc<Self> {
        Arc::new(Self {
            stop,
            triggered: AtomicBool::new(false),
        })
    }

    /// Request shutdown; only the first call has an effect
    ///
    /// Never blocks on the SDK.
    pub fn trigger(&self, reason: ShutdownReason) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            info!("Already shutting down, ignoring {}", reason);
            return;
        }

        warn!("Shutting down: {}", reason);
        self.stop.request_stop(&reason.to_string());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Start listening for SIGINT and SIGTERM
    pub fn install_signal_handlers(self: &Arc<Self>) -> Result<SignalListener> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build signal runtime")?;

        // Register before returning so a signal arriving right away is seen
        let signals = {
            let _guard = runtime.enter();
            Signals::register().context("Failed to register signal handlers")?
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let coordinator = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || runtime.block_on(listen(coordinator, signals, cancel_rx)))
            .context("Failed to spawn signal listener")?;

        debug!("Signal handlers installed");

        Ok(SignalListener {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }
}

async fn listen(
    coordinator: Arc<ShutdownCoordinator>,
    mut signals: Signals,
    mut cancel: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            reason = signals.recv() => match reason {
                Some(reason) => coordinator.trigger(reason),
                None => break,
            },
            _ = &mut cancel => break,
        }
    }
    debug!("Signal listener stopped");
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> Option<ShutdownReason> {
        tokio::select! {
            received = self.interrupt.recv() => received.map(|_| ShutdownReason::Interrupt),
            received = self.terminate.recv() => received.map(|_| ShutdownReason::Terminate),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<ShutdownReason> {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|_| ShutdownReason::Interrupt)
    }
}

/// Running signal listener; disarmed and joined on drop
pub struct SignalListener {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Stop listening and wait for the listener thread to exit
    pub fn disarm(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Signal listener thread panicked");
            }
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.stop();
    }
}
