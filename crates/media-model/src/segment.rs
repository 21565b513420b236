//! Speed segments, pitch policies, and named presets.
//!
//! A segment reads "from `start`, play at `speed` using `pitch`, until `end`
//! (or the next segment's start, or the end of the asset)". Segments are
//! plain values: they are validated once when a request is accepted and
//! never mutated afterwards.

use std::str::FromStr;

use retime_common::error::{RetimeError, RetimeResult};
use serde::{Deserialize, Serialize};

/// Slowest accepted playback multiplier.
pub const MIN_SPEED: f64 = 0.1;

/// Fastest accepted playback multiplier.
pub const MAX_SPEED: f64 = 32.0;

/// How audio pitch is treated when a segment is time-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PitchPolicy {
    /// Speech-oriented pitch preservation.
    Voice,
    /// General-purpose pitch preservation.
    #[default]
    HighQuality,
    /// No preservation: pitch follows speed.
    None,
}

impl PitchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            PitchPolicy::Voice => "voice",
            PitchPolicy::HighQuality => "highQuality",
            PitchPolicy::None => "none",
        }
    }
}

impl FromStr for PitchPolicy {
    type Err = RetimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voice" => Ok(PitchPolicy::Voice),
            "highquality" | "high-quality" | "high_quality" | "hq" => Ok(PitchPolicy::HighQuality),
            "none" | "varispeed" => Ok(PitchPolicy::None),
            other => Err(RetimeError::invalid(format!(
                "unknown pitch policy '{other}' (expected voice, highQuality, none)"
            ))),
        }
    }
}

/// One caller-specified sub-interval of source time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedSegment {
    /// Source start time in seconds.
    pub start: f64,

    /// Source end time in seconds; `None` runs to the next segment or the
    /// end of the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,

    /// Playback multiplier in `[MIN_SPEED, MAX_SPEED]`.
    pub speed: f64,

    #[serde(default, alias = "pitchPolicy")]
    pub pitch: PitchPolicy,
}

impl SpeedSegment {
    pub fn new(start: f64, speed: f64, pitch: PitchPolicy) -> Self {
        Self {
            start,
            end: None,
            speed,
            pitch,
        }
    }

    pub fn with_end(mut self, end: f64) -> Self {
        self.end = Some(end);
        self
    }

    /// The segment substituted when a request carries none: the whole
    /// asset at normal speed.
    pub fn full_duration() -> Self {
        Self::new(0.0, 1.0, PitchPolicy::HighQuality)
    }

    /// Check the segment's own fields. Range degeneracy (`end <= start`) is
    /// not an error here; the builder skips such segments.
    pub fn validate(&self) -> RetimeResult<()> {
        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(RetimeError::invalid(format!(
                "speed {} outside [{MIN_SPEED}, {MAX_SPEED}]",
                self.speed
            )));
        }
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(RetimeError::invalid(format!(
                "segment start {} must be a non-negative number of seconds",
                self.start
            )));
        }
        if let Some(end) = self.end {
            if !end.is_finite() || end < 0.0 {
                return Err(RetimeError::invalid(format!(
                    "segment end {end} must be a non-negative number of seconds"
                )));
            }
        }
        Ok(())
    }
}

/// Named speed recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    #[serde(rename = "2x-lecture")]
    Lecture2x,
    #[serde(rename = "16x-timelapse")]
    Timelapse16x,
    #[serde(rename = "slowmo-sports")]
    SlowmoSports,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Lecture2x, Preset::Timelapse16x, Preset::SlowmoSports];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Lecture2x => "2x-lecture",
            Preset::Timelapse16x => "16x-timelapse",
            Preset::SlowmoSports => "slowmo-sports",
        }
    }

    /// Canonical one-segment expansion.
    pub fn segments(self) -> Vec<SpeedSegment> {
        let segment = match self {
            Preset::Lecture2x => SpeedSegment::new(0.0, 2.0, PitchPolicy::Voice),
            Preset::Timelapse16x => SpeedSegment::new(0.0, 16.0, PitchPolicy::None),
            Preset::SlowmoSports => SpeedSegment::new(0.0, 0.5, PitchPolicy::HighQuality),
        };
        vec![segment]
    }
}

impl FromStr for Preset {
    type Err = RetimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                RetimeError::invalid(format!(
                    "unknown preset '{s}' (expected 2x-lecture, 16x-timelapse, slowmo-sports)"
                ))
            })
    }
}

/// Where a resolved segment list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSource {
    Preset(Preset),
    Explicit,
    Default,
}

/// A validated, non-empty segment list ready for composition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegments {
    pub segments: Vec<SpeedSegment>,
    pub source: SegmentSource,
}

/// Turn caller input into the segment list used for composition.
///
/// A preset takes precedence over explicit segments; an absent or empty
/// list falls back to [`SpeedSegment::full_duration`]. Every segment is
/// validated, and starts must be non-decreasing.
pub fn resolve_segments(
    segments: Option<&[SpeedSegment]>,
    preset: Option<Preset>,
) -> RetimeResult<ResolvedSegments> {
    let resolved = match (preset, segments) {
        (Some(preset), _) => ResolvedSegments {
            segments: preset.segments(),
            source: SegmentSource::Preset(preset),
        },
        (None, Some(list)) if !list.is_empty() => ResolvedSegments {
            segments: list.to_vec(),
            source: SegmentSource::Explicit,
        },
        (None, _) => ResolvedSegments {
            segments: vec![SpeedSegment::full_duration()],
            source: SegmentSource::Default,
        },
    };

    validate_segments(&resolved.segments)?;
    Ok(resolved)
}

/// Validate a segment list: non-empty, each segment valid, starts ordered.
pub fn validate_segments(segments: &[SpeedSegment]) -> RetimeResult<()> {
    if segments.is_empty() {
        return Err(RetimeError::invalid("segment list is empty"));
    }
    for (index, segment) in segments.iter().enumerate() {
        segment
            .validate()
            .map_err(|e| RetimeError::invalid(format!("segment {index}: {e}")))?;
    }
    if let Some(index) = segments
        .windows(2)
        .position(|pair| pair[1].start < pair[0].start)
    {
        return Err(RetimeError::invalid(format!(
            "segments must be ordered by start time (segment {} starts at {} after {})",
            index + 1,
            segments[index + 1].start,
            segments[index].start
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use retime_common::error::ErrorCode;

    #[test]
    fn test_preset_expansion_table() {
        assert_eq!(
            Preset::Lecture2x.segments(),
            vec![SpeedSegment::new(0.0, 2.0, PitchPolicy::Voice)]
        );
        assert_eq!(
            Preset::Timelapse16x.segments(),
            vec![SpeedSegment::new(0.0, 16.0, PitchPolicy::None)]
        );
        assert_eq!(
            Preset::SlowmoSports.segments(),
            vec![SpeedSegment::new(0.0, 0.5, PitchPolicy::HighQuality)]
        );
    }

    #[test]
    fn test_preset_wire_names() {
        let preset: Preset = serde_json::from_str("\"16x-timelapse\"").unwrap();
        assert_eq!(preset, Preset::Timelapse16x);
        assert_eq!("2x-lecture".parse::<Preset>().unwrap(), Preset::Lecture2x);
        assert!("4x-anything".parse::<Preset>().is_err());
    }

    #[test]
    fn test_segment_json_defaults_pitch() {
        let segment: SpeedSegment = serde_json::from_str(r#"{"start": 3, "speed": 1.5}"#).unwrap();
        assert_eq!(segment.pitch, PitchPolicy::HighQuality);
        assert_eq!(segment.end, None);

        let segment: SpeedSegment =
            serde_json::from_str(r#"{"start": 0, "end": 4, "speed": 2, "pitchPolicy": "none"}"#)
                .unwrap();
        assert_eq!(segment.pitch, PitchPolicy::None);
        assert_eq!(segment.end, Some(4.0));
    }

    #[test]
    fn test_missing_segments_resolve_to_default() {
        let resolved = resolve_segments(None, None).unwrap();
        assert_eq!(resolved.source, SegmentSource::Default);
        assert_eq!(resolved.segments, vec![SpeedSegment::full_duration()]);

        let resolved = resolve_segments(Some(&[]), None).unwrap();
        assert_eq!(resolved.source, SegmentSource::Default);
    }

    #[test]
    fn test_preset_wins_over_explicit_segments() {
        let explicit = [SpeedSegment::new(0.0, 4.0, PitchPolicy::Voice)];
        let resolved = resolve_segments(Some(&explicit), Some(Preset::SlowmoSports)).unwrap();
        assert_eq!(resolved.source, SegmentSource::Preset(Preset::SlowmoSports));
        assert_eq!(resolved.segments[0].speed, 0.5);
    }

    #[test]
    fn test_speed_bounds_are_inclusive() {
        assert!(SpeedSegment::new(0.0, MIN_SPEED, PitchPolicy::None)
            .validate()
            .is_ok());
        assert!(SpeedSegment::new(0.0, MAX_SPEED, PitchPolicy::None)
            .validate()
            .is_ok());

        for speed in [0.0, 0.099, 32.01, -1.0, f64::NAN, f64::INFINITY] {
            let err = resolve_segments(Some(&[SpeedSegment::new(0.0, speed, PitchPolicy::None)]), None)
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidParameters, "speed {speed}");
        }
    }

    #[test]
    fn test_negative_times_rejected() {
        let err = SpeedSegment::new(-1.0, 1.0, PitchPolicy::Voice)
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);

        let err = SpeedSegment::new(0.0, 1.0, PitchPolicy::Voice)
            .with_end(-2.0)
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn test_unsorted_segments_rejected() {
        let segments = [
            SpeedSegment::new(10.0, 1.0, PitchPolicy::Voice),
            SpeedSegment::new(5.0, 2.0, PitchPolicy::Voice),
        ];
        let err = validate_segments(&segments).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
        assert!(err.to_string().contains("ordered"));
    }

    #[test]
    fn test_equal_starts_are_ordered() {
        let segments = [
            SpeedSegment::new(5.0, 1.0, PitchPolicy::Voice),
            SpeedSegment::new(5.0, 2.0, PitchPolicy::Voice),
        ];
        assert!(validate_segments(&segments).is_ok());
    }

    #[test]
    fn test_pitch_policy_parsing() {
        assert_eq!("voice".parse::<PitchPolicy>().unwrap(), PitchPolicy::Voice);
        assert_eq!(
            "highQuality".parse::<PitchPolicy>().unwrap(),
            PitchPolicy::HighQuality
        );
        assert_eq!("none".parse::<PitchPolicy>().unwrap(), PitchPolicy::None);
        assert!("robot".parse::<PitchPolicy>().is_err());
    }
}
