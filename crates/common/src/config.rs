//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::RetimeResult;

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// External tool locations.
    pub tools: ToolPaths,

    /// Progress sampling settings.
    pub progress: ProgressConfig,

    /// Maximum number of renders allowed to run at once (`None` = unlimited).
    pub max_concurrent_exports: Option<usize>,

    /// How segment pitch policies are bound onto the composed audio track.
    pub pitch_binding: PitchBinding,

    /// Default encoder parameters.
    pub encoding: EncodingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Paths to the external media tools. Unset entries are looked up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

/// Progress reporter cadence and buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Sampling interval in milliseconds.
    pub interval_ms: u64,

    /// Capacity of the bounded progress channel.
    pub channel_capacity: usize,
}

/// Binding of segment pitch policies onto the output audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchBinding {
    /// One algorithm for the whole track, taken from the first segment.
    #[default]
    Track,
    /// Each audio clip keeps the policy of the segment it came from.
    Clip,
}

/// Default encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingDefaults {
    /// ffmpeg video encoder name.
    pub video_codec: String,

    /// Encoder speed preset.
    pub preset: String,

    /// Constant rate factor.
    pub crf: u32,

    /// ffmpeg audio encoder name.
    pub audio_codec: String,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "retime_render_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            progress: ProgressConfig::default(),
            max_concurrent_exports: None,
            pitch_binding: PitchBinding::default(),
            encoding: EncodingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            channel_capacity: 64,
        }
    }
}

impl ProgressConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for EncodingDefaults {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl EngineConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    /// Load config from an explicit file.
    pub fn load_from(path: impl AsRef<Path>) -> RetimeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("retime").join("config.json")
}
