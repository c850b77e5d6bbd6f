//! Session lifecycle management
//!
//! This module provides the `SessionMachine` that owns the single
//! conferencing session:
//! - SDK initialization and authentication
//! - Meeting join, leave and status callbacks
//! - Audio subscription and the producer thread's lifetime
//! - Shutdown and resource release

mod config;
mod machine;
mod state;
mod stats;

pub use config::SessionConfig;
pub use machine::{validate_join_request, SessionMachine, StopHandle};
pub use state::{Session, SessionState};
pub use stats::SessionStats;
