// Audio streaming pipeline
//
// One producer thread per joined meeting. Every cadence tick it pulls a
// chunk-sized buffer from the source and hands it to the sink. Between ticks
// it sleeps in slices no longer than the poll interval and re-checks whether
// streaming is still allowed, so a stop request is observed within one poll
// interval.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::chunk::{chunk_len, AudioChunk, CHUNK_CADENCE, POLL_INTERVAL};
use super::sink::AudioSink;
use super::source::AudioSource;

/// The pipeline's view of the session it streams for
pub trait StreamControl: Send + Sync {
    /// Snapshot check: still in the meeting, audio subscribed, no termination
    fn should_stream(&self) -> bool;

    /// Ask the session to shut down after an unrecoverable pipeline error
    fn request_stop(&self, reason: &str);
}

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interval between chunks
    pub cadence: Duration,
    /// How often the stop conditions are re-checked (capped at 10ms)
    pub poll_interval: Duration,
}

impl PipelineConfig {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            cadence: CHUNK_CADENCE,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn chunk_len(&self) -> usize {
        chunk_len(self.sample_rate, self.channels)
    }
}

/// What the producer thread did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub chunks_forwarded: u64,
    pub bytes_forwarded: u64,
    /// Cadence ticks dropped because the thread fell behind
    pub ticks_skipped: u64,
    /// Source or sink failure that ended the stream
    pub error: Option<String>,
}

/// Handle to the running producer thread
pub struct PipelineHandle {
    handle: JoinHandle<PipelineReport>,
}

impl PipelineHandle {
    /// Wait for the producer thread to exit
    pub fn join(self) -> PipelineReport {
        match self.handle.join() {
            Ok(report) => report,
            Err(_) => {
                error!("Audio pipeline thread panicked");
                PipelineReport {
                    error: Some("pipeline thread panicked".to_string()),
                    ..PipelineReport::default()
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub struct AudioPipeline {
    config: PipelineConfig,
    source: Box<dyn AudioSource>,
    sink: Box<dyn AudioSink>,
    control: Arc<dyn StreamControl>,
}

impl AudioPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        control: Arc<dyn StreamControl>,
    ) -> Self {
        let mut config = config;
        config.poll_interval = config.poll_interval.min(POLL_INTERVAL);

        Self {
            config,
            source,
            sink,
            control,
        }
    }

    /// Start the producer thread
    pub fn spawn(self) -> Result<PipelineHandle> {
        let handle = thread::Builder::new()
            .name("audio-pipeline".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn audio pipeline thread")?;

        Ok(PipelineHandle { handle })
    }

    fn run(mut self) -> PipelineReport {
        let len = self.config.chunk_len();
        let cadence = self.config.cadence;

        info!(
            "Audio pipeline started: {} -> {} ({}Hz, {} channels, {} bytes per {:?})",
            self.source.name(),
            self.sink.name(),
            self.config.sample_rate,
            self.config.channels,
            len,
            cadence
        );

        let started = Instant::now();
        let mut next_tick = started + cadence;
        let mut report = PipelineReport::default();

        while self.control.should_stream() {
            let now = Instant::now();
            if now < next_tick {
                thread::sleep((next_tick - now).min(self.config.poll_interval));
                continue;
            }

            // Ticks that were missed are dropped, never replayed
            let behind = ((now - next_tick).as_nanos() / cadence.as_nanos().max(1)) as u32;
            if behind > 0 {
                debug!("Pipeline fell {} ticks behind, skipping them", behind);
                report.ticks_skipped += behind as u64;
            }
            let tick_at = next_tick + cadence * behind;
            next_tick = tick_at + cadence;

            let mut data = vec![0u8; len];
            if let Err(e) = self.source.fill(&mut data) {
                error!("Audio source {} failed: {:#}", self.source.name(), e);
                report.error = Some(format!("{:#}", e));
                self.control.request_stop("audio source failed");
                break;
            }

            // Last check before hand-off
            if !self.control.should_stream() {
                break;
            }

            let chunk = AudioChunk {
                data,
                sample_rate: self.config.sample_rate,
                channels: self.config.channels,
                sequence: report.chunks_forwarded,
                timestamp_ms: (tick_at - started).as_millis() as u64,
            };

            if let Err(e) = self.sink.write_chunk(chunk) {
                error!("Audio sink {} failed: {:#}", self.sink.name(), e);
                report.error = Some(format!("{:#}", e));
                self.control.request_stop("audio sink failed");
                break;
            }

            report.chunks_forwarded += 1;
            report.bytes_forwarded += len as u64;
        }

        if let Err(e) = self.sink.finish() {
            warn!("Failed to finish audio sink {}: {:#}", self.sink.name(), e);
        }

        info!(
            "Audio pipeline stopped: {} chunks, {} bytes forwarded",
            report.chunks_forwarded, report.bytes_forwarded
        );

        report
    }
}
