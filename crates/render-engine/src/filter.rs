//! ffmpeg `-filter_complex` generation for a composition.

use retime_media_model::media::TrackKind;
use retime_media_model::timeline::{ClipMix, OutputClip, PitchAlgorithm, TIME_EPSILON};

use crate::composition::Composition;

/// Lower bound of a single `atempo` stage.
const ATEMPO_MIN: f64 = 0.5;
/// Upper bound of a single `atempo` stage.
const ATEMPO_MAX: f64 = 2.0;

/// Output pad carrying the composed video.
pub const VIDEO_PAD: &str = "vout";
/// Output pad carrying the composed audio.
pub const AUDIO_PAD: &str = "aout";

/// Input streams feeding the graph, by container stream index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStreams {
    pub video: usize,
    pub audio: usize,
    /// Source audio sample rate, needed by varispeed clips.
    pub sample_rate: u32,
}

/// A generated filter graph and the pads it exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub graph: String,
    pub video: bool,
    pub audio: bool,
}

/// Split a tempo factor into `atempo` stages that each stay within
/// `[0.5, 2.0]` and multiply back to `speed`. Unit speed needs no stage.
pub fn atempo_chain(speed: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    if (remaining - 1.0).abs() > TIME_EPSILON {
        stages.push(remaining);
    }
    stages
}

/// Build the filter graph for `composition`, reading the `sources` streams of
/// input 0.
pub fn build_filter_graph(composition: &Composition, sources: &SourceStreams) -> FilterGraph {
    let mut chains = Vec::new();
    let timeline = &composition.timeline;

    let video = timeline
        .track(TrackKind::Video)
        .filter(|track| !track.clips.is_empty());
    if let Some(track) = video {
        for (i, clip) in track.clips.iter().enumerate() {
            chains.push(video_clip_chain(i, clip, sources.video));
        }
        let inputs: String = (0..track.clips.len()).map(|i| format!("[v{i}]")).collect();
        chains.push(format!(
            "{inputs}concat=n={}:v=1:a=0[{VIDEO_PAD}]",
            track.clips.len()
        ));
    }

    let audio = timeline
        .track(TrackKind::Audio)
        .filter(|track| !track.clips.is_empty());
    if let Some(track) = audio {
        for (i, clip) in track.clips.iter().enumerate() {
            let mix = composition.mix.clips.get(i).copied().unwrap_or(ClipMix {
                algorithm: PitchAlgorithm::from(clip.pitch),
                speed: clip.speed,
            });
            chains.push(audio_clip_chain(i, clip, mix, sources));
        }
        let inputs: String = (0..track.clips.len()).map(|i| format!("[a{i}]")).collect();
        let gain = if composition.mix.adjusts_gain() {
            format!(",volume={}", num(composition.mix.gain))
        } else {
            String::new()
        };
        chains.push(format!(
            "{inputs}concat=n={}:v=0:a=1{gain}[{AUDIO_PAD}]",
            track.clips.len()
        ));
    }

    FilterGraph {
        graph: chains.join(";"),
        video: video.is_some(),
        audio: audio.is_some(),
    }
}

fn video_clip_chain(i: usize, clip: &OutputClip, stream: usize) -> String {
    format!(
        "[0:{stream}]trim=start={}:end={},setpts=(PTS-STARTPTS)/{}[v{i}]",
        num(clip.source.start),
        num(clip.source.end),
        num(clip.speed)
    )
}

fn audio_clip_chain(i: usize, clip: &OutputClip, mix: ClipMix, sources: &SourceStreams) -> String {
    let mut chain = format!(
        "[0:{}]atrim=start={}:end={},asetpts=PTS-STARTPTS",
        sources.audio,
        num(clip.source.start),
        num(clip.source.end)
    );
    if (mix.speed - 1.0).abs() > TIME_EPSILON {
        match mix.algorithm {
            PitchAlgorithm::Spectral => {
                for stage in atempo_chain(mix.speed) {
                    chain.push_str(&format!(",atempo={}", num(stage)));
                }
            }
            PitchAlgorithm::Varispeed => {
                let rate = sources.sample_rate;
                let shifted = (rate as f64 * mix.speed).round() as u64;
                chain.push_str(&format!(",asetrate={shifted},aresample={rate}"));
            }
        }
    }
    chain.push_str(&format!("[a{i}]"));
    chain
}

/// Fixed-precision number without trailing zeros.
fn num(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
