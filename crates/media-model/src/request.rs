//! Request shapes accepted by the engine.
//!
//! Each request has a `validate`-style method that runs before any asset is
//! opened or any file is touched, so parameter errors never leave partial
//! output behind.

use std::path::{Path, PathBuf};

use retime_common::error::{RetimeError, RetimeResult};
use serde::{Deserialize, Serialize};

use crate::segment::{resolve_segments, Preset, ResolvedSegments, SpeedSegment};

/// Which media kinds the output should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Video,
    Audio,
    #[default]
    Both,
}

impl OutputFormat {
    /// Narrow the requested format to what the container can hold.
    pub fn effective_for(self, container: OutputContainer) -> RetimeResult<OutputFormat> {
        if container.supports_video() {
            return Ok(self);
        }
        match self {
            OutputFormat::Video => Err(RetimeError::invalid(format!(
                "container {} cannot hold video",
                container.extension()
            ))),
            OutputFormat::Audio | OutputFormat::Both => Ok(OutputFormat::Audio),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = RetimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(OutputFormat::Video),
            "audio" => Ok(OutputFormat::Audio),
            "both" => Ok(OutputFormat::Both),
            other => Err(RetimeError::invalid(format!(
                "unknown output format '{other}' (expected video, audio, both)"
            ))),
        }
    }
}

/// Output container, inferred from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputContainer {
    Mp4,
    Mov,
    Mkv,
    M4a,
}

impl OutputContainer {
    pub fn from_path(path: &Path) -> RetimeResult<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                RetimeError::invalid(format!(
                    "output {} has no file extension to infer a container from",
                    path.display()
                ))
            })?;
        match ext.as_str() {
            "mp4" | "m4v" => Ok(OutputContainer::Mp4),
            "mov" => Ok(OutputContainer::Mov),
            "mkv" => Ok(OutputContainer::Mkv),
            "m4a" => Ok(OutputContainer::M4a),
            other => Err(RetimeError::invalid(format!(
                "unsupported output container '.{other}' (expected mp4, m4v, mov, mkv, m4a)"
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputContainer::Mp4 => "mp4",
            OutputContainer::Mov => "mov",
            OutputContainer::Mkv => "mkv",
            OutputContainer::M4a => "m4a",
        }
    }

    /// ffmpeg muxer name.
    pub fn muxer(self) -> &'static str {
        match self {
            OutputContainer::Mp4 => "mp4",
            OutputContainer::Mov => "mov",
            OutputContainer::Mkv => "matroska",
            OutputContainer::M4a => "ipod",
        }
    }

    pub fn supports_video(self) -> bool {
        !matches!(self, OutputContainer::M4a)
    }
}

/// Time-scale an asset by speed segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub segments: Option<Vec<SpeedSegment>>,
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
}

impl ProcessRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            segments: None,
            preset: None,
            output_format: None,
        }
    }

    pub fn with_segments(mut self, segments: Vec<SpeedSegment>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Resolve presets/defaults and validate everything that does not need
    /// the asset.
    pub fn validate(&self) -> RetimeResult<ValidatedOutput<ResolvedSegments>> {
        ensure_distinct(&self.input, &self.output)?;
        let segments = resolve_segments(self.segments.as_deref(), self.preset)?;
        let container = OutputContainer::from_path(&self.output)?;
        let format = self
            .output_format
            .unwrap_or_default()
            .effective_for(container)?;
        Ok(ValidatedOutput {
            container,
            format,
            params: segments,
        })
    }
}

/// Cut `[start_time, end_time)` out of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
}

impl TrimRequest {
    pub fn validate(&self) -> RetimeResult<ValidatedOutput<(f64, f64)>> {
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(RetimeError::invalid(format!(
                "trim start {} must be a non-negative number of seconds",
                self.start_time
            )));
        }
        if !self.end_time.is_finite() || self.end_time <= self.start_time {
            return Err(RetimeError::invalid(format!(
                "trim end {} must be after start {}",
                self.end_time, self.start_time
            )));
        }
        ensure_distinct(&self.input, &self.output)?;
        let container = OutputContainer::from_path(&self.output)?;
        Ok(ValidatedOutput {
            container,
            format: OutputFormat::Both.effective_for(container)?,
            params: (self.start_time, self.end_time),
        })
    }
}

/// Scale audio gain across a whole asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Gain multiplier; 0 mutes, 1 leaves audio unchanged.
    pub volume: f64,
}

impl VolumeRequest {
    pub fn validate(&self) -> RetimeResult<ValidatedOutput<f64>> {
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(RetimeError::invalid(format!(
                "volume {} must be a non-negative multiplier",
                self.volume
            )));
        }
        ensure_distinct(&self.input, &self.output)?;
        let container = OutputContainer::from_path(&self.output)?;
        Ok(ValidatedOutput {
            container,
            format: OutputFormat::Both.effective_for(container)?,
            params: self.volume,
        })
    }
}

/// Grab one still frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub time: f64,
    #[serde(default)]
    pub max_width: Option<u32>,
}

impl ThumbnailRequest {
    pub fn validate(&self) -> RetimeResult<()> {
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(RetimeError::invalid(format!(
                "thumbnail time {} must be a non-negative number of seconds",
                self.time
            )));
        }
        if self.max_width == Some(0) {
            return Err(RetimeError::invalid("thumbnail max width must be positive"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(RetimeError::invalid("thumbnail output path is empty"));
        }
        ensure_distinct(&self.input, &self.output)
    }
}

/// Read-only metadata query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRequest {
    pub input: PathBuf,
}

/// Reject an output path that names the input. Aliases that only resolve to
/// the same file on disk are caught by the engine before it writes.
fn ensure_distinct(input: &Path, output: &Path) -> RetimeResult<()> {
    if input == output {
        return Err(RetimeError::invalid(format!(
            "output {} would overwrite the input",
            output.display()
        )));
    }
    Ok(())
}

/// Output settings that passed validation, plus operation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOutput<P> {
    pub container: OutputContainer,
    pub format: OutputFormat,
    pub params: P,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentSource;
    use retime_common::error::ErrorCode;

    #[test]
    fn test_process_request_from_json() {
        let request: ProcessRequest = serde_json::from_str(
            r#"{
                "input": "/in.mov",
                "output": "/out.mp4",
                "segments": [{"start": 0, "end": 10, "speed": 2.0}, {"start": 10, "speed": 1.0}],
                "outputFormat": "video"
            }"#,
        )
        .unwrap();
        let validated = request.validate().unwrap();
        assert_eq!(validated.container, OutputContainer::Mp4);
        assert_eq!(validated.format, OutputFormat::Video);
        assert_eq!(validated.params.source, SegmentSource::Explicit);
        assert_eq!(validated.params.segments.len(), 2);
    }

    #[test]
    fn test_output_must_differ_from_input() {
        let err = ProcessRequest::new("/media/in.mp4", "/media/./in.mp4")
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);

        let trim = TrimRequest {
            input: "/media/in.mp4".into(),
            output: "/media/in.mp4".into(),
            start_time: 0.0,
            end_time: 5.0,
        };
        assert_eq!(trim.validate().unwrap_err().code(), ErrorCode::InvalidParameters);

        let volume = VolumeRequest {
            input: "/media/in.mov".into(),
            output: "/media/in.mov".into(),
            volume: 0.5,
        };
        assert_eq!(volume.validate().unwrap_err().code(), ErrorCode::InvalidParameters);

        let thumbnail = ThumbnailRequest {
            input: "/media/in.jpg".into(),
            output: "/media/in.jpg".into(),
            time: 0.0,
            max_width: None,
        };
        assert_eq!(thumbnail.validate().unwrap_err().code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn test_unknown_container_rejected() {
        let err = ProcessRequest::new("/in.mov", "/out.avi")
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);

        let err = ProcessRequest::new("/in.mov", "/out").validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn test_audio_container_narrows_format() {
        let validated = ProcessRequest::new("/in.mov", "/out.m4a").validate().unwrap();
        assert_eq!(validated.format, OutputFormat::Audio);

        let err = ProcessRequest::new("/in.mov", "/out.m4a")
            .with_output_format(OutputFormat::Video)
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn test_trim_range_validation() {
        let trim = |start, end| TrimRequest {
            input: "/in.mov".into(),
            output: "/out.mp4".into(),
            start_time: start,
            end_time: end,
        };
        assert!(trim(10.5, 45.0).validate().is_ok());
        assert!(trim(-1.0, 4.0).validate().is_err());
        assert!(trim(5.0, 5.0).validate().is_err());
        assert!(trim(6.0, 5.0).validate().is_err());
    }

    #[test]
    fn test_volume_must_be_non_negative() {
        let volume = |v| VolumeRequest {
            input: "/in.mov".into(),
            output: "/out.mov".into(),
            volume: v,
        };
        assert!(volume(0.0).validate().is_ok());
        assert!(volume(2.5).validate().is_ok());
        assert!(volume(-0.1).validate().is_err());
        assert!(volume(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_thumbnail_validation() {
        let request = ThumbnailRequest {
            input: "/in.mov".into(),
            output: "/thumb.jpg".into(),
            time: 1.0,
            max_width: Some(320),
        };
        assert!(request.validate().is_ok());

        let bad = ThumbnailRequest {
            max_width: Some(0),
            ..request.clone()
        };
        assert!(bad.validate().is_err());

        let bad = ThumbnailRequest {
            time: -3.0,
            ..request
        };
        assert!(bad.validate().is_err());
    }
}
