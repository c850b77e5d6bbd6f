// Shared helpers for integration tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use meeting_audio_relay::audio::{AudioChunk, AudioSink, SilenceSource};
use meeting_audio_relay::sdk::{CallbackMode, Credential, JoinRequest, SimulatedAdapter, SimulationConfig};
use meeting_audio_relay::{SessionConfig, SessionMachine, TerminationSignal};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A chunk as seen by the sink, with its arrival time
#[derive(Debug, Clone)]
pub struct Received {
    pub chunk: AudioChunk,
    pub at: Instant,
}

/// Sink that keeps every chunk in memory
pub struct CollectingSink {
    received: Arc<Mutex<Vec<Received>>>,
}

impl AudioSink for CollectingSink {
    fn write_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        self.received.lock().unwrap().push(Received {
            chunk,
            at: Instant::now(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "collector"
    }
}

/// Sink whose consumer has gone away
pub struct BrokenSink;

impl AudioSink for BrokenSink {
    fn write_chunk(&mut self, _chunk: AudioChunk) -> Result<()> {
        bail!("broken pipe")
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Read side of a `CollectingSink`
#[derive(Clone)]
pub struct Collected(Arc<Mutex<Vec<Received>>>);

impl Collected {
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Received> {
        self.0.lock().unwrap().clone()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.all().iter().map(|r| r.chunk.data.len()).collect()
    }
}

pub fn collector() -> (Box<dyn AudioSink>, Collected) {
    let received = Arc::new(Mutex::new(Vec::new()));
    (
        Box::new(CollectingSink {
            received: Arc::clone(&received),
        }),
        Collected(received),
    )
}

pub fn simulation(mode: CallbackMode) -> SimulationConfig {
    SimulationConfig {
        callback_mode: mode,
        callback_delay_ms: 5,
        ..SimulationConfig::default()
    }
}

pub fn credential() -> Credential {
    Credential::new("header.payload.signature")
}

pub fn request(sample_rate: u32, channels: u16) -> JoinRequest {
    JoinRequest {
        meeting_id: "123456789".to_string(),
        password: String::new(),
        sample_rate,
        channels,
    }
}

pub struct Harness {
    pub adapter: Arc<SimulatedAdapter>,
    pub machine: Arc<SessionMachine>,
    pub collected: Collected,
}

pub fn harness(sim: SimulationConfig) -> Harness {
    harness_with_sink(sim, None)
}

pub fn harness_with_sink(sim: SimulationConfig, sink: Option<Box<dyn AudioSink>>) -> Harness {
    let adapter = Arc::new(SimulatedAdapter::new(sim));
    let (collecting, collected) = collector();
    let sink = sink.unwrap_or(collecting);

    let machine = SessionMachine::new(
        adapter.clone(),
        Box::new(SilenceSource),
        sink,
        TerminationSignal::new(),
        SessionConfig {
            callback_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        },
    );

    Harness {
        adapter,
        machine,
        collected,
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
