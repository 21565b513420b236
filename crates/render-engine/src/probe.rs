//! ffprobe-backed [`MediaProber`].
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON into [`MediaInfo`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use retime_common::config::ToolPaths;
use retime_common::error::{RetimeError, RetimeResult};
use retime_media_model::media::{parse_frame_rate, MediaInfo, TrackInfo, TrackKind};
use serde::Deserialize;
use tokio::process::Command;

use crate::asset::MediaProber;
use crate::tools::locate_tool;

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    pub fn from_config(tools: &ToolPaths) -> Self {
        Self::new(locate_tool(tools.ffprobe.as_deref(), "ffprobe"))
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> RetimeResult<MediaInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RetimeError::unsupported(format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(RetimeError::unsupported(format!(
                "ffprobe could not open {} (status {})",
                path.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).ok();
        parse_ffprobe_json(path, &stdout, file_size)
    }

    fn name(&self) -> &str {
        "ffprobe"
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<usize>,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    pix_fmt: Option<String>,
    sample_fmt: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Map ffprobe JSON into [`MediaInfo`]. `file_size` overrides the size the
/// container reports when known.
pub(crate) fn parse_ffprobe_json(
    path: &Path,
    json: &str,
    file_size: Option<u64>,
) -> RetimeResult<MediaInfo> {
    let output: FfprobeOutput = serde_json::from_str(json).map_err(|e| {
        RetimeError::unsupported(format!("unreadable ffprobe output for {}: {e}", path.display()))
    })?;

    let format = output.format.ok_or_else(|| {
        RetimeError::unsupported(format!("{} is not a recognised container", path.display()))
    })?;

    let mut tracks = Vec::new();
    let mut longest_stream = 0.0f64;

    for (position, stream) in output.streams.into_iter().enumerate() {
        let index = stream.index.unwrap_or(position);
        if let Some(d) = stream.duration.as_deref().and_then(|d| d.parse::<f64>().ok()) {
            longest_stream = longest_stream.max(d);
        }
        let codec = stream.codec_name.unwrap_or_default();
        match stream.codec_type.as_deref() {
            Some("video") => {
                // Cover art and embedded thumbnails.
                if stream.disposition.attached_pic != 0 {
                    continue;
                }
                let frame_rate = stream
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));
                tracks.push(TrackInfo {
                    kind: TrackKind::Video,
                    index,
                    codec,
                    width: stream.width,
                    height: stream.height,
                    frame_rate,
                    sample_rate: None,
                    channels: None,
                    descriptor: stream.pix_fmt,
                });
            }
            Some("audio") => {
                tracks.push(TrackInfo {
                    kind: TrackKind::Audio,
                    index,
                    codec,
                    width: None,
                    height: None,
                    frame_rate: None,
                    sample_rate: stream.sample_rate.and_then(|s| s.parse().ok()),
                    channels: stream.channels,
                    descriptor: stream.sample_fmt,
                });
            }
            _ => {}
        }
    }

    let duration_secs = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(longest_stream);

    Ok(MediaInfo {
        path: path.to_path_buf(),
        duration_secs,
        container: format.format_name.unwrap_or_default(),
        file_size: file_size
            .or_else(|| format.size.and_then(|s| s.parse().ok()))
            .unwrap_or(0),
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use retime_common::error::ErrorCode;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30000/1001",
                "duration": "20.020000"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_fmt": "fltp",
                "sample_rate": "48000",
                "channels": 2,
                "duration": "20.000000"
            },
            {
                "index": 2,
                "codec_name": "mov_text",
                "codec_type": "subtitle"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "20.020000",
            "size": "5242880"
        }
    }"#;

    #[test]
    fn test_parse_sample_output() {
        let info = parse_ffprobe_json(Path::new("/in.mp4"), SAMPLE, None).unwrap();
        assert!((info.duration_secs - 20.02).abs() < 1e-9);
        assert_eq!(info.file_size, 5_242_880);
        assert_eq!(info.tracks.len(), 2);

        let video = info.first(TrackKind::Video).unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!(video.width, Some(1920));
        assert!((video.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(video.descriptor.as_deref(), Some("yuv420p"));

        let audio = info.first(TrackKind::Audio).unwrap();
        assert_eq!(audio.sample_rate, Some(48_000));
        assert_eq!(audio.channels, Some(2));
    }

    #[test]
    fn test_file_size_override_wins() {
        let info = parse_ffprobe_json(Path::new("/in.mp4"), SAMPLE, Some(7)).unwrap();
        assert_eq!(info.file_size, 7);
    }

    #[test]
    fn test_cover_art_is_not_a_video_track() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_name": "mp3", "codec_type": "audio", "sample_rate": "44100", "channels": 2},
                {"index": 1, "codec_name": "mjpeg", "codec_type": "video", "width": 600, "height": 600,
                 "disposition": {"default": 0, "attached_pic": 1}}
            ],
            "format": {"format_name": "mp3", "duration": "180.5"}
        }"#;
        let info = parse_ffprobe_json(Path::new("/song.mp3"), json, None).unwrap();
        assert!(!info.has(TrackKind::Video));
        assert!(info.has(TrackKind::Audio));
    }

    #[test]
    fn test_leading_attached_picture_keeps_real_stream_indices() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_name": "png", "codec_type": "video", "width": 320, "height": 320,
                 "disposition": {"attached_pic": 1}},
                {"index": 1, "codec_name": "h264", "codec_type": "video", "width": 1280, "height": 720,
                 "avg_frame_rate": "25/1", "duration": "60.0", "disposition": {"attached_pic": 0}},
                {"index": 2, "codec_name": "aac", "codec_type": "audio", "sample_rate": "48000",
                 "duration": "60.0", "disposition": {"attached_pic": 0}}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "60.0"}
        }"#;
        let info = parse_ffprobe_json(Path::new("/album.mp4"), json, None).unwrap();
        assert_eq!(info.tracks_of(TrackKind::Video).count(), 1);

        let video = info.first(TrackKind::Video).unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!(video.index, 1);
        assert_eq!(info.first(TrackKind::Audio).unwrap().index, 2);
    }

    #[test]
    fn test_motion_jpeg_without_duration_is_video() {
        let json = r#"{
            "streams": [
                {"codec_name": "mjpeg", "codec_type": "video", "width": 640, "height": 480,
                 "r_frame_rate": "15/1"}
            ],
            "format": {"format_name": "avi", "duration": "12.0"}
        }"#;
        let info = parse_ffprobe_json(Path::new("/cam.avi"), json, None).unwrap();
        let video = info.first(TrackKind::Video).unwrap();
        assert_eq!(video.codec, "mjpeg");
        assert_eq!(video.index, 0);
    }

    #[test]
    fn test_missing_format_is_unsupported() {
        let err = parse_ffprobe_json(Path::new("/junk.bin"), r#"{"streams": []}"#, None)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedFormat);

        let err = parse_ffprobe_json(Path::new("/junk.bin"), "not json", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    }
}
