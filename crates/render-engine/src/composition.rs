//! Timeline composition: turns a segment list into output clips.
//!
//! Every media kind present in the render gets one composed track. All
//! tracks share the same cuts, so audio and video stay aligned clip for
//! clip. Clips are laid back-to-back from output time zero.

use retime_common::config::PitchBinding;
use retime_common::error::{RetimeError, RetimeResult};
use retime_media_model::media::TrackKind;
use retime_media_model::request::OutputFormat;
use retime_media_model::segment::{
    validate_segments, PitchPolicy, ResolvedSegments, SegmentSource, SpeedSegment,
};
use retime_media_model::timeline::{
    ClipMix, ComposedTimeline, ComposedTrack, MixPlan, OutputClip, PitchAlgorithm, TimeRange,
    TIME_EPSILON,
};

use crate::asset::AssetHandle;

/// A composed timeline together with its audio mix plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub timeline: ComposedTimeline,
    pub mix: MixPlan,
}

impl Composition {
    /// Output duration in seconds.
    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }
}

/// Compose `segments` against an asset of `duration` seconds carrying `kinds`.
///
/// Each segment's end resolves to its explicit end, else the next segment's
/// start, else the asset duration, and is always clamped to the duration.
/// Segments whose resolved range is empty are skipped.
pub fn compose(
    duration: f64,
    kinds: &[TrackKind],
    segments: &[SpeedSegment],
    binding: PitchBinding,
) -> RetimeResult<Composition> {
    validate_segments(segments)?;

    let mut clips = Vec::with_capacity(segments.len());
    let mut cursor = 0.0f64;
    for (index, segment) in segments.iter().enumerate() {
        let end = segment
            .end
            .or_else(|| segments.get(index + 1).map(|next| next.start))
            .unwrap_or(duration)
            .min(duration);
        let length = end - segment.start;
        if length <= TIME_EPSILON {
            tracing::debug!(
                index,
                start = segment.start,
                end,
                "Skipping degenerate segment"
            );
            continue;
        }

        let scaled = length / segment.speed;
        clips.push(OutputClip {
            source: TimeRange::new(segment.start, end),
            output: TimeRange::new(cursor, cursor + scaled),
            speed: segment.speed,
            pitch: segment.pitch,
        });
        cursor += scaled;
    }

    // `validate_segments` guarantees a first segment.
    let track_policy = segments[0].pitch;
    Ok(assemble(kinds, clips, |clip| match binding {
        PitchBinding::Track => track_policy,
        PitchBinding::Clip => clip.pitch,
    }))
}

/// Compose a single speed-1.0 cut `[start, end)`; `end` is clamped to the
/// asset duration.
pub fn compose_trim(
    duration: f64,
    kinds: &[TrackKind],
    start: f64,
    end: f64,
) -> RetimeResult<Composition> {
    if start >= duration {
        return Err(RetimeError::invalid(format!(
            "trim start {start} is at or past the end of the asset ({duration}s)"
        )));
    }
    let end = end.min(duration);
    if end - start <= TIME_EPSILON {
        return Err(RetimeError::invalid(format!(
            "trim range [{start}, {end}) is empty"
        )));
    }

    let clip = OutputClip {
        source: TimeRange::new(start, end),
        output: TimeRange::new(0.0, end - start),
        speed: 1.0,
        pitch: PitchPolicy::HighQuality,
    };
    Ok(assemble(kinds, vec![clip], |clip| clip.pitch))
}

/// Compose the whole asset 1:1 with a track gain.
pub fn compose_identity(duration: f64, kinds: &[TrackKind], gain: f64) -> Composition {
    let clips = if duration > TIME_EPSILON {
        vec![OutputClip {
            source: TimeRange::new(0.0, duration),
            output: TimeRange::new(0.0, duration),
            speed: 1.0,
            pitch: PitchPolicy::HighQuality,
        }]
    } else {
        Vec::new()
    };
    let mut composition = assemble(kinds, clips, |clip| clip.pitch);
    composition.mix = composition.mix.with_gain(gain);
    composition
}

fn assemble(
    kinds: &[TrackKind],
    clips: Vec<OutputClip>,
    policy_for: impl Fn(&OutputClip) -> PitchPolicy,
) -> Composition {
    let mix = if kinds.contains(&TrackKind::Audio) {
        MixPlan {
            clips: clips
                .iter()
                .map(|clip| ClipMix {
                    algorithm: PitchAlgorithm::from(policy_for(clip)),
                    speed: clip.speed,
                })
                .collect(),
            ..MixPlan::default()
        }
    } else {
        MixPlan::default()
    };

    let timeline = ComposedTimeline {
        tracks: kinds
            .iter()
            .map(|kind| ComposedTrack {
                kind: *kind,
                clips: clips.clone(),
            })
            .collect(),
    };

    Composition { timeline, mix }
}

/// Media kinds of `asset` that the output should carry.
///
/// An explicitly requested kind the asset lacks is `UnsupportedFormat`.
pub async fn select_kinds(asset: &AssetHandle, format: OutputFormat) -> RetimeResult<Vec<TrackKind>> {
    match format {
        OutputFormat::Both => asset.kinds().await,
        OutputFormat::Video => {
            asset.require(TrackKind::Video).await?;
            Ok(vec![TrackKind::Video])
        }
        OutputFormat::Audio => {
            asset.require(TrackKind::Audio).await?;
            Ok(vec![TrackKind::Audio])
        }
    }
}

/// Compose resolved segments against an opened asset.
///
/// When every caller-supplied segment turns out degenerate for this asset,
/// the default full-duration segment is used instead.
pub async fn build(
    asset: &AssetHandle,
    segments: &ResolvedSegments,
    format: OutputFormat,
    binding: PitchBinding,
) -> RetimeResult<Composition> {
    let duration = asset.duration().await?;
    let kinds = select_kinds(asset, format).await?;

    let composition = compose(duration, &kinds, &segments.segments, binding)?;
    if composition.timeline.is_empty() && segments.source == SegmentSource::Explicit {
        tracing::info!(
            segments = segments.segments.len(),
            duration_secs = duration,
            "All segments are degenerate, using full-duration default"
        );
        return compose(duration, &kinds, &[SpeedSegment::full_duration()], binding);
    }

    Ok(composition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use retime_common::error::ErrorCode;
    use retime_media_model::segment::{resolve_segments, Preset};

    const AV: [TrackKind; 2] = [TrackKind::Video, TrackKind::Audio];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_two_segment_example() {
        let segments = [
            SpeedSegment::new(0.0, 2.0, PitchPolicy::Voice).with_end(10.0),
            SpeedSegment::new(10.0, 1.0, PitchPolicy::Voice),
        ];
        let composition = compose(20.0, &AV, &segments, PitchBinding::Track).unwrap();
        assert!(approx(composition.duration(), 15.0));

        let video = composition.timeline.track(TrackKind::Video).unwrap();
        assert_eq!(video.clips.len(), 2);
        assert!(approx(video.clips[0].output.end, 5.0));
        assert!(approx(video.clips[1].output.start, 5.0));
        assert!(approx(video.clips[1].source.end, 20.0));
        assert_eq!(composition.mix.clips.len(), 2);
    }

    #[test]
    fn test_timelapse_preset_applies_varispeed_everywhere() {
        let resolved = resolve_segments(None, Some(Preset::Timelapse16x)).unwrap();
        let composition =
            compose(160.0, &AV, &resolved.segments, PitchBinding::Track).unwrap();
        assert!(approx(composition.duration(), 10.0));
        assert!(composition
            .mix
            .clips
            .iter()
            .all(|clip| clip.algorithm == PitchAlgorithm::Varispeed));
    }

    #[test]
    fn test_track_binding_uses_first_policy() {
        let segments = [
            SpeedSegment::new(0.0, 2.0, PitchPolicy::None).with_end(4.0),
            SpeedSegment::new(4.0, 1.5, PitchPolicy::Voice),
        ];
        let track = compose(10.0, &AV, &segments, PitchBinding::Track).unwrap();
        assert!(track
            .mix
            .clips
            .iter()
            .all(|clip| clip.algorithm == PitchAlgorithm::Varispeed));

        let per_clip = compose(10.0, &AV, &segments, PitchBinding::Clip).unwrap();
        assert_eq!(per_clip.mix.clips[0].algorithm, PitchAlgorithm::Varispeed);
        assert_eq!(per_clip.mix.clips[1].algorithm, PitchAlgorithm::Spectral);
    }

    #[test]
    fn test_degenerate_segments_contribute_nothing() {
        let segments = [
            SpeedSegment::new(0.0, 1.0, PitchPolicy::Voice).with_end(0.0),
            SpeedSegment::new(2.0, 2.0, PitchPolicy::Voice).with_end(6.0),
            SpeedSegment::new(8.0, 4.0, PitchPolicy::Voice).with_end(7.0),
        ];
        let composition = compose(30.0, &AV, &segments, PitchBinding::Track).unwrap();
        assert_eq!(composition.timeline.tracks[0].clips.len(), 1);
        assert!(approx(composition.duration(), 2.0));
    }

    #[test]
    fn test_explicit_end_is_clamped_to_duration() {
        let segments = [SpeedSegment::new(5.0, 0.5, PitchPolicy::HighQuality).with_end(100.0)];
        let composition = compose(10.0, &AV, &segments, PitchBinding::Track).unwrap();
        assert!(approx(composition.duration(), 10.0));
        assert!(approx(composition.timeline.source_duration(), 5.0));
    }

    #[test]
    fn test_audio_only_asset_has_no_video_track() {
        let segments = [SpeedSegment::full_duration()];
        let composition =
            compose(12.0, &[TrackKind::Audio], &segments, PitchBinding::Track).unwrap();
        assert!(composition.timeline.track(TrackKind::Video).is_none());
        assert_eq!(composition.mix.clips.len(), 1);

        let composition =
            compose(12.0, &[TrackKind::Video], &segments, PitchBinding::Track).unwrap();
        assert!(composition.mix.clips.is_empty());
    }

    #[test]
    fn test_out_of_range_speed_rejected() {
        let segments = [SpeedSegment::new(0.0, 64.0, PitchPolicy::None)];
        let err = compose(10.0, &AV, &segments, PitchBinding::Track).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);

        let err = compose(10.0, &AV, &[], PitchBinding::Track).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn test_trim_duration_and_bounds() {
        let composition = compose_trim(60.0, &AV, 10.5, 45.0).unwrap();
        assert!(approx(composition.duration(), 34.5));

        let clamped = compose_trim(20.0, &AV, 10.0, 45.0).unwrap();
        assert!(approx(clamped.duration(), 10.0));

        let err = compose_trim(20.0, &AV, 20.0, 45.0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn test_identity_carries_gain() {
        let composition = compose_identity(8.0, &AV, 0.0);
        assert!(approx(composition.duration(), 8.0));
        assert_eq!(composition.mix.gain, 0.0);
        assert_eq!(composition.mix.clips.len(), 1);
        assert!(approx(composition.mix.clips[0].speed, 1.0));
    }

    fn segment_list() -> impl Strategy<Value = (f64, Vec<SpeedSegment>)> {
        let segment = (0.0f64..120.0, prop::option::of(0.0f64..150.0), 0.1f64..=32.0);
        (1.0f64..120.0, prop::collection::vec(segment, 1..8)).prop_map(|(duration, raw)| {
            let mut segments: Vec<SpeedSegment> = raw
                .into_iter()
                .map(|(start, end, speed)| SpeedSegment {
                    start,
                    end,
                    speed,
                    pitch: PitchPolicy::HighQuality,
                })
                .collect();
            segments.sort_by(|a, b| a.start.total_cmp(&b.start));
            (duration, segments)
        })
    }

    proptest! {
        #[test]
        fn prop_output_duration_is_sum_of_scaled_lengths((duration, segments) in segment_list()) {
            let composition = compose(duration, &AV, &segments, PitchBinding::Clip).unwrap();

            let mut expected = 0.0;
            for (i, segment) in segments.iter().enumerate() {
                let end = segment
                    .end
                    .unwrap_or_else(|| segments.get(i + 1).map_or(duration, |n| n.start))
                    .min(duration);
                if end - segment.start > TIME_EPSILON {
                    expected += (end - segment.start) / segment.speed;
                }
            }
            prop_assert!((composition.duration() - expected).abs() < 1e-6);

            for track in &composition.timeline.tracks {
                let mut cursor = 0.0;
                for clip in &track.clips {
                    prop_assert!((clip.output.start - cursor).abs() < 1e-9);
                    prop_assert!(clip.output.end > clip.output.start);
                    cursor = clip.output.end;
                }
            }
            prop_assert_eq!(
                composition.mix.clips.len(),
                composition.timeline.tracks[0].clips.len()
            );
        }
    }
}
