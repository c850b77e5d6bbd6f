use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{
    AudioSink, AudioSource, RawPcmSink, SilenceSource, SourceKind, ToneSource, WavFileSink,
    WavLoopSource,
};
use crate::sdk::SimulationConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
    pub sdk: SdkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub source: SourceKind,
    pub tone_hz: f32,
    pub wav_path: Option<String>,
}

/// Output format of the audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Headerless 16-bit LE PCM
    Raw,
    /// WAV file (requires an output path)
    Wav,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// None = stdout
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    pub callback_timeout_secs: u64,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "config/meeting-audio-relay";

    /// Load an explicitly named file, which must exist, or else the optional
    /// default file
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path, true),
            None => Self::load_file(Self::DEFAULT_PATH, false),
        }
    }

    /// Defaults, then the file at `path`, then `MEETING_RELAY__*`
    /// environment variables
    pub fn load_file(path: &str, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "meeting-audio-relay")?
            .set_default("audio.sample_rate", 16000)?
            .set_default("audio.channels", 1)?
            .set_default("audio.source", "silence")?
            .set_default("audio.tone_hz", 440.0)?
            .set_default("output.format", "raw")?
            .set_default("sdk.callback_timeout_secs", 30)?
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix("MEETING_RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl SdkConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

impl AudioConfig {
    /// Build the configured source for the negotiated format
    pub fn open_source(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn AudioSource>> {
        Ok(match self.source {
            SourceKind::Silence => Box::new(SilenceSource),
            SourceKind::Tone => Box::new(ToneSource::new(self.tone_hz, sample_rate, channels)),
            SourceKind::Wav => {
                let Some(path) = &self.wav_path else {
                    bail!("audio.source = \"wav\" requires audio.wav_path");
                };
                Box::new(WavLoopSource::open(path, sample_rate, channels)?)
            }
        })
    }
}

impl OutputConfig {
    /// Build the configured sink for the negotiated format
    pub fn open_sink(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn AudioSink>> {
        Ok(match (self.format, &self.path) {
            (OutputFormat::Raw, None) => Box::new(RawPcmSink::stdout()),
            (OutputFormat::Raw, Some(path)) => Box::new(RawPcmSink::create(path)?),
            (OutputFormat::Wav, Some(path)) => {
                Box::new(WavFileSink::create(path.clone(), sample_rate, channels)?)
            }
            (OutputFormat::Wav, None) => bail!("WAV output needs a file path (--output)"),
        })
    }
}
