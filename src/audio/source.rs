// Audio sources feeding the streaming pipeline
//
// A source fills one chunk-sized buffer per cadence tick. The SDK's raw
// audio callback would sit behind this trait for a vendor integration; the
// built-in sources generate silence, a test tone, or loop a WAV file.

use anyhow::{bail, Context, Result};
use hound::WavReader;
use serde::Deserialize;
use std::f32::consts::TAU;
use std::path::Path;
use tracing::info;

use super::chunk::BYTES_PER_SAMPLE;

/// Producer of raw 16-bit LE PCM
pub trait AudioSource: Send {
    /// Fill `buf` entirely with interleaved samples
    fn fill(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Which built-in source to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Silence,
    Tone,
    Wav,
}

pub struct SilenceSource;

impl AudioSource for SilenceSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        buf.fill(0);
        Ok(())
    }

    fn name(&self) -> &str {
        "silence"
    }
}

/// Sine test tone, same signal on every channel
pub struct ToneSource {
    frequency_hz: f32,
    sample_rate: u32,
    channels: u16,
    phase: f32,
}

impl ToneSource {
    pub fn new(frequency_hz: f32, sample_rate: u32, channels: u16) -> Self {
        Self {
            frequency_hz,
            sample_rate,
            channels,
            phase: 0.0,
        }
    }
}

impl AudioSource for ToneSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let step = TAU * self.frequency_hz / self.sample_rate as f32;
        let frame_bytes = self.channels as usize * BYTES_PER_SAMPLE;

        for frame in buf.chunks_exact_mut(frame_bytes) {
            // -6 dBFS
            let sample = (self.phase.sin() * i16::MAX as f32 * 0.5) as i16;
            for slot in frame.chunks_exact_mut(BYTES_PER_SAMPLE) {
                slot.copy_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + step) % TAU;
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "tone"
    }
}

/// Loops the samples of a WAV file forever
pub struct WavLoopSource {
    samples: Vec<i16>,
    position: usize,
}

impl WavLoopSource {
    /// Load a 16-bit WAV file whose format matches the session's
    pub fn open(path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "{} is not 16-bit integer PCM ({} bits, {:?})",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            );
        }
        if spec.sample_rate != sample_rate || spec.channels != channels {
            bail!(
                "{} is {}Hz/{}ch but the session negotiated {}Hz/{}ch",
                path.display(),
                spec.sample_rate,
                spec.channels,
                sample_rate,
                channels
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        if samples.is_empty() {
            bail!("{} contains no samples", path.display());
        }

        info!(
            "Audio file loaded: {}Hz, {} channels, {} samples",
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            samples,
            position: 0,
        })
    }
}

impl AudioSource for WavLoopSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.chunks_exact_mut(BYTES_PER_SAMPLE) {
            slot.copy_from_slice(&self.samples[self.position].to_le_bytes());
            self.position = (self.position + 1) % self.samples.len();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "wav"
    }
}
