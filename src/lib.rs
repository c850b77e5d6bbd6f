pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod sdk;
pub mod session;
pub mod shutdown;

pub use audio::{
    chunk_len, AudioChunk, AudioPipeline, AudioSink, AudioSource, PipelineConfig, PipelineReport,
    RawPcmSink, StreamControl, WavFileSink,
};
pub use cli::Args;
pub use config::Config;
pub use error::SessionError;
pub use runner::{ExitStatus, SessionRunner};
pub use sdk::{
    Credential, JoinRequest, MeetingAdapter, MeetingErrorCode, MeetingStatus, SimulatedAdapter,
    SimulationConfig,
};
pub use session::{SessionConfig, SessionMachine, SessionState, SessionStats};
pub use shutdown::{ShutdownCoordinator, ShutdownReason, TerminationSignal};
