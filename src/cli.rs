use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, OutputFormat};
use crate::error::SessionError;
use crate::sdk::{Credential, JoinRequest};
use crate::session::validate_join_request;

/// Join a meeting and stream its raw audio to stdout or a file
#[derive(Debug, Parser)]
#[command(name = "meeting-audio-relay", version)]
pub struct Args {
    /// Meeting to join
    #[arg(long = "meeting-id", alias = "meeting_id")]
    pub meeting_id: String,

    /// SDK credential (signed JWT)
    #[arg(long, env = "MEETING_RELAY_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Meeting password
    #[arg(long, default_value = "")]
    pub password: String,

    /// Sample rate in Hz (overrides audio.sample_rate)
    #[arg(long = "sample-rate", alias = "sample_rate")]
    pub sample_rate: Option<u32>,

    /// 1 = mono, 2 = stereo (overrides audio.channels)
    #[arg(long)]
    pub channels: Option<u16>,

    /// Write audio here instead of stdout (overrides output.path)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Output format (overrides output.format)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Configuration file, extension optional; must exist when given
    /// (otherwise config/meeting-audio-relay is read if present)
    #[arg(long)]
    pub config: Option<String>,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(sample_rate) = self.sample_rate {
            config.audio.sample_rate = sample_rate;
        }
        if let Some(channels) = self.channels {
            config.audio.channels = channels;
        }
        if let Some(path) = &self.output {
            config.output.path = Some(path.clone());
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
    }

    /// Validated credential and join parameters
    pub fn session_params(&self, config: &Config) -> Result<(Credential, JoinRequest), SessionError> {
        let credential = Credential::new(self.token.trim());
        if credential.is_empty() {
            return Err(SessionError::InvalidParameters("missing --token".to_string()));
        }

        let request = JoinRequest {
            meeting_id: self.meeting_id.trim().to_string(),
            password: self.password.clone(),
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
        };
        validate_join_request(&request)?;

        Ok((credential, request))
    }
}
