//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Highest constant rate factor accepted by any encoder (AV1 encoders use 0-63).
pub const MAX_QUALITY: u32 = 63;

/// Highest constant rate factor of the x264/x265 family.
pub const MAX_QUALITY_X26X: u32 = 51;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is unusable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// External encoder invocation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Encoder executable (default "ffmpeg")
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the input/output arguments
    #[serde(default = "default_program_args")]
    pub program_args: Vec<String>,
    /// Video codec passed to `-c:v`
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Encoder speed preset passed to `-preset`
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Audio codec passed to `-c:a`
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Constant rate factor, lower = higher quality and larger output (default 50)
    #[serde(default = "default_quality")]
    pub quality: u32,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["-hide_banner".to_string()]
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_quality() -> u32 {
    50
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: default_program_args(),
            video_codec: default_video_codec(),
            preset: default_preset(),
            audio_codec: default_audio_codec(),
            quality: default_quality(),
        }
    }
}

impl EncoderConfig {
    /// Highest `quality` the configured video codec accepts
    pub fn max_quality(&self) -> u32 {
        let codec = self.video_codec.to_lowercase();
        if ["264", "265", "hevc"].iter().any(|family| codec.contains(family)) {
            MAX_QUALITY_X26X
        } else {
            MAX_QUALITY
        }
    }
}

/// Batch planning and resume settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Input file extension without the dot, matched case-insensitively
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Suffix appended to the file stem to form the output name
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
    /// Location of the resume checkpoint file
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

fn default_extension() -> String {
    "mp4".to_string()
}

fn default_output_suffix() -> String {
    "_compressed".to_string()
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("compression_resume.json")
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            output_suffix: default_output_suffix(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - VIDSHRINK_ENCODER -> encoder.program
    /// - VIDSHRINK_QUALITY -> encoder.quality
    /// - VIDSHRINK_EXTENSION -> batch.extension
    /// - VIDSHRINK_OUTPUT_SUFFIX -> batch.output_suffix
    /// - VIDSHRINK_CHECKPOINT -> batch.checkpoint_path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("VIDSHRINK_ENCODER") {
            if !val.trim().is_empty() {
                self.encoder.program = val;
            }
        }

        if let Ok(val) = env::var("VIDSHRINK_QUALITY") {
            if let Ok(quality) = val.trim().parse::<u32>() {
                self.encoder.quality = quality;
            }
        }

        if let Ok(val) = env::var("VIDSHRINK_EXTENSION") {
            let ext = val.trim().trim_start_matches('.');
            if !ext.is_empty() {
                self.batch.extension = ext.to_string();
            }
        }

        if let Ok(val) = env::var("VIDSHRINK_OUTPUT_SUFFIX") {
            if !val.is_empty() {
                self.batch.output_suffix = val;
            }
        }

        if let Ok(val) = env::var("VIDSHRINK_CHECKPOINT") {
            if !val.trim().is_empty() {
                self.batch.checkpoint_path = PathBuf::from(val);
            }
        }
    }

    /// Check that the values can drive a batch
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoder.program.trim().is_empty() {
            return Err(ConfigError::Invalid("encoder.program is empty".to_string()));
        }
        let max_quality = self.encoder.max_quality();
        if self.encoder.quality > max_quality {
            return Err(ConfigError::Invalid(format!(
                "encoder.quality {} is above {} for {}",
                self.encoder.quality, max_quality, self.encoder.video_codec
            )));
        }
        if self.batch.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid("batch.extension is empty".to_string()));
        }
        if self.batch.output_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "batch.output_suffix is empty; outputs would overwrite their sources".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}
