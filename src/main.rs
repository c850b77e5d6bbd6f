use anyhow::Result;
use clap::Parser;
use meeting_audio_relay::{
    Args, Config, ExitStatus, SessionConfig, SessionMachine, SessionRunner, ShutdownCoordinator,
    SimulatedAdapter, TerminationSignal,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitStatus {
    // stdout carries the audio stream, diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitStatus::InvalidParameters
            } else {
                // --help / --version
                ExitStatus::Success
            };
        }
    };

    let mut cfg = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            let path = args.config.as_deref().unwrap_or(Config::DEFAULT_PATH);
            error!("Failed to load configuration from {}: {:#}", path, e);
            return ExitStatus::InvalidParameters;
        }
    };
    args.apply_overrides(&mut cfg);

    match run(&args, &cfg) {
        Ok(status) => status,
        Err(e) => {
            error!("{:#}", e);
            ExitStatus::InvalidParameters
        }
    }
}

fn run(args: &Args, cfg: &Config) -> Result<ExitStatus> {
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let (credential, request) = args.session_params(cfg)?;

    let source = cfg.audio.open_source(request.sample_rate, request.channels)?;
    let sink = cfg.output.open_sink(request.sample_rate, request.channels)?;

    let adapter = Arc::new(SimulatedAdapter::new(cfg.sdk.simulation.clone()));
    let session_config = SessionConfig {
        callback_timeout: cfg.sdk.callback_timeout(),
        ..SessionConfig::default()
    };
    let machine = SessionMachine::new(adapter, source, sink, TerminationSignal::new(), session_config);

    let coordinator = ShutdownCoordinator::new(machine.stop_handle());
    let signals = coordinator.install_signal_handlers()?;

    let status = SessionRunner::new(Arc::clone(&machine)).run(&credential, &request);
    signals.disarm();

    match serde_json::to_string(&machine.stats()) {
        Ok(summary) => info!("Session summary: {}", summary),
        Err(e) => warn!("Failed to serialize session summary: {}", e),
    }

    Ok(status)
}
