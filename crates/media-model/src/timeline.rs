//! Composed timeline and audio mix plan.
//!
//! A composed timeline is the edit produced from a segment list: per media
//! kind, an ordered run of clips laid back-to-back on the output timeline,
//! each mapping a source range onto a (scaled) output range.

use serde::{Deserialize, Serialize};

use crate::media::TrackKind;
use crate::segment::PitchPolicy;

/// Tolerance used when comparing second values produced by arithmetic.
pub const TIME_EPSILON: f64 = 1e-9;

/// Half-open time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One time-scaled piece of the output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputClip {
    /// Range consumed from the source.
    pub source: TimeRange,

    /// Range produced on the output timeline.
    pub output: TimeRange,

    /// Playback multiplier (`source.duration() / output.duration()`).
    pub speed: f64,

    /// Pitch policy of the originating segment.
    pub pitch: PitchPolicy,
}

/// The clips of one media kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedTrack {
    pub kind: TrackKind,
    pub clips: Vec<OutputClip>,
}

impl ComposedTrack {
    pub fn duration(&self) -> f64 {
        self.clips.last().map(|clip| clip.output.end).unwrap_or(0.0)
    }
}

/// The full edit: at most one composed track per media kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposedTimeline {
    pub tracks: Vec<ComposedTrack>,
}

impl ComposedTimeline {
    pub fn track(&self, kind: TrackKind) -> Option<&ComposedTrack> {
        self.tracks.iter().find(|track| track.kind == kind)
    }

    /// Output duration in seconds.
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .map(ComposedTrack::duration)
            .fold(0.0, f64::max)
    }

    /// Source seconds consumed (per track; all tracks share the same cuts).
    pub fn source_duration(&self) -> f64 {
        self.tracks
            .first()
            .map(|track| track.clips.iter().map(|clip| clip.source.duration()).sum())
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|track| track.clips.is_empty())
    }
}

/// Audio time-scaling algorithm bound at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchAlgorithm {
    /// Pitch-preserving time stretch.
    Spectral,
    /// Resampling: pitch shifts with speed.
    Varispeed,
}

impl From<PitchPolicy> for PitchAlgorithm {
    fn from(policy: PitchPolicy) -> Self {
        match policy {
            PitchPolicy::Voice | PitchPolicy::HighQuality => PitchAlgorithm::Spectral,
            PitchPolicy::None => PitchAlgorithm::Varispeed,
        }
    }
}

/// Mix directive for a single audio clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipMix {
    pub algorithm: PitchAlgorithm,
    pub speed: f64,
}

/// Render-time audio directives: one per audio clip plus a track gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixPlan {
    pub clips: Vec<ClipMix>,
    pub gain: f64,
}

impl Default for MixPlan {
    fn default() -> Self {
        Self {
            clips: Vec::new(),
            gain: 1.0,
        }
    }
}

impl MixPlan {
    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Whether the gain stage changes anything.
    pub fn adjusts_gain(&self) -> bool {
        (self.gain - 1.0).abs() > TIME_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(source: (f64, f64), output: (f64, f64), speed: f64) -> OutputClip {
        OutputClip {
            source: TimeRange::new(source.0, source.1),
            output: TimeRange::new(output.0, output.1),
            speed,
            pitch: PitchPolicy::HighQuality,
        }
    }

    #[test]
    fn test_timeline_duration_is_last_clip_end() {
        let timeline = ComposedTimeline {
            tracks: vec![
                ComposedTrack {
                    kind: TrackKind::Video,
                    clips: vec![clip((0.0, 10.0), (0.0, 5.0), 2.0), clip((10.0, 20.0), (5.0, 15.0), 1.0)],
                },
                ComposedTrack {
                    kind: TrackKind::Audio,
                    clips: vec![clip((0.0, 10.0), (0.0, 5.0), 2.0), clip((10.0, 20.0), (5.0, 15.0), 1.0)],
                },
            ],
        };
        assert!((timeline.duration() - 15.0).abs() < TIME_EPSILON);
        assert!((timeline.source_duration() - 20.0).abs() < TIME_EPSILON);
        assert!(!timeline.is_empty());
    }

    #[test]
    fn test_policy_to_algorithm_mapping() {
        assert_eq!(PitchAlgorithm::from(PitchPolicy::Voice), PitchAlgorithm::Spectral);
        assert_eq!(
            PitchAlgorithm::from(PitchPolicy::HighQuality),
            PitchAlgorithm::Spectral
        );
        assert_eq!(PitchAlgorithm::from(PitchPolicy::None), PitchAlgorithm::Varispeed);
    }

    #[test]
    fn test_unit_gain_is_not_an_adjustment() {
        assert!(!MixPlan::default().adjusts_gain());
        assert!(MixPlan::default().with_gain(0.0).adjusts_gain());
    }
}
