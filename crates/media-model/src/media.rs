//! Media description types: tracks, probe results, and the metadata
//! response returned to callers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// One track of a probed asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub kind: TrackKind,

    /// Stream index within the container (ffmpeg `0:N`).
    pub index: usize,

    /// Codec identifier (e.g. "h264", "aac").
    pub codec: String,

    /// Natural size (video only).
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,

    /// Nominal frame rate (video only).
    #[serde(default)]
    pub frame_rate: Option<f64>,

    /// Sample rate in Hz (audio only).
    #[serde(default)]
    pub sample_rate: Option<u32>,

    /// Channel count (audio only).
    #[serde(default)]
    pub channels: Option<u32>,

    /// Format-specific descriptor: pixel format for video, sample format
    /// for audio.
    #[serde(default)]
    pub descriptor: Option<String>,
}

/// Everything known about an asset after probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,

    /// Duration in seconds.
    pub duration_secs: f64,

    /// Container format name as reported by the prober.
    #[serde(default)]
    pub container: String,

    /// Size on disk in bytes.
    pub file_size: u64,

    pub tracks: Vec<TrackInfo>,
}

impl MediaInfo {
    /// Tracks of one kind, in stream order.
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(move |track| track.kind == kind)
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks_of(kind).next().is_some()
    }

    pub fn first(&self, kind: TrackKind) -> Option<&TrackInfo> {
        self.tracks_of(kind).next()
    }
}

/// Read-only metadata answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub video_codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    pub file_size: u64,
}

/// Parse an ffmpeg-style rational frame rate ("30000/1001", "25/1", "25").
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
