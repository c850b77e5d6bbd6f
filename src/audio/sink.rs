use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::chunk::AudioChunk;

/// Downstream consumer of audio chunks
///
/// `write_chunk` is called synchronously from the producer thread once per
/// cadence tick and must return promptly; the pipeline applies no
/// backpressure of its own.
pub trait AudioSink: Send {
    fn write_chunk(&mut self, chunk: AudioChunk) -> Result<()>;

    /// Flush and close the stream
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Raw PCM byte stream with no framing between chunks
pub struct RawPcmSink<W: Write + Send> {
    writer: W,
    name: String,
}

impl RawPcmSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), "stdout")
    }
}

impl RawPcmSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file), path.display().to_string()))
    }
}

impl<W: Write + Send> RawPcmSink<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AudioSink for RawPcmSink<W> {
    fn write_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        self.writer
            .write_all(&chunk.data)
            .with_context(|| format!("Failed to write chunk {} to {}", chunk.sequence, self.name))?;
        // The consumer reads in real time
        self.writer.flush().context("Failed to flush audio stream")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush audio stream")
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes the stream into a single WAV file
pub struct WavFileSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    name: String,
    samples_written: usize,
}

impl WavFileSink {
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Result<Self> {
        let path = path.into();
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Writing audio to {} ({}Hz, {} channels)", path.display(), sample_rate, channels);

        Ok(Self {
            writer: Some(writer),
            name: path.display().to_string(),
            path,
            samples_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSink for WavFileSink {
    fn write_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for sample in chunk.samples() {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.samples_written += chunk.data.len() / 2;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
            info!("WAV file complete: {} ({} samples)", self.name, self.samples_written);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
