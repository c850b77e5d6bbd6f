//! Conferencing SDK boundary
//!
//! The session depends only on the [`MeetingAdapter`] trait. A vendor SDK is
//! integrated by implementing it; [`SimulatedAdapter`] is the built-in
//! deterministic implementation.

pub mod adapter;
pub mod simulated;

pub use adapter::{
    AdapterListener, AuthResult, Credential, JoinRequest, MeetingAdapter, MeetingErrorCode,
    MeetingStatus, SdkError,
};
pub use simulated::{CallCounts, CallbackMode, SimulatedAdapter, SimulationConfig};
