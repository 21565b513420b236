//! Time-scale a file by speed segments or a preset.

use std::path::{Path, PathBuf};

use anyhow::Context;
use retime_media_model::request::{OutputFormat, ProcessRequest};
use retime_media_model::segment::{PitchPolicy, Preset, SpeedSegment};
use retime_render_engine::Engine;

use super::{failure, follow};

pub async fn run(
    engine: &Engine,
    input: PathBuf,
    output: PathBuf,
    preset: Option<String>,
    segment_specs: Vec<String>,
    segments_file: Option<PathBuf>,
    format: Option<String>,
) -> anyhow::Result<()> {
    let mut request = ProcessRequest::new(&input, &output);

    if let Some(name) = preset {
        request = request.with_preset(name.parse::<Preset>().map_err(failure)?);
    }

    let mut segments = match segments_file {
        Some(path) => load_segments(&path)?,
        None => Vec::new(),
    };
    for spec in &segment_specs {
        segments.push(parse_segment(spec)?);
    }
    if !segments.is_empty() {
        request = request.with_segments(segments);
    }

    if let Some(format) = format {
        request = request.with_output_format(format.parse::<OutputFormat>().map_err(failure)?);
    }

    println!("Processing: {}", input.display());
    match (&request.preset, &request.segments) {
        (Some(preset), _) => println!("  Preset: {}", preset.name()),
        (None, Some(segments)) => println!("  Segments: {}", segments.len()),
        (None, None) => println!("  Segments: full duration at 1.0x"),
    }
    println!("  Output: {}", output.display());

    let ticket = engine.start_process(request).map_err(failure)?;
    tracing::debug!(job = %ticket.id(), "Export started");
    let written = follow(engine, ticket).await?;

    println!("Export complete: {}", written.display());
    Ok(())
}

fn load_segments(path: &Path) -> anyhow::Result<Vec<SpeedSegment>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read segments file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid segments JSON in {}", path.display()))
}

/// Parse `START[:END]@SPEED[/PITCH]`.
fn parse_segment(spec: &str) -> anyhow::Result<SpeedSegment> {
    let (range, rest) = spec
        .split_once('@')
        .with_context(|| format!("Segment '{spec}' is missing '@SPEED'"))?;
    let (speed, pitch) = match rest.split_once('/') {
        Some((speed, pitch)) => (speed, pitch.parse::<PitchPolicy>().map_err(failure)?),
        None => (rest, PitchPolicy::default()),
    };
    let speed: f64 = speed
        .trim()
        .parse()
        .with_context(|| format!("Invalid speed in segment '{spec}'"))?;

    let (start, end) = match range.split_once(':') {
        Some((start, end)) => (start, Some(end)),
        None => (range, None),
    };
    let start: f64 = start
        .trim()
        .parse()
        .with_context(|| format!("Invalid start in segment '{spec}'"))?;

    let segment = SpeedSegment::new(start, speed, pitch);
    match end.map(str::trim).filter(|end| !end.is_empty()) {
        Some(end) => {
            let end: f64 = end
                .parse()
                .with_context(|| format!("Invalid end in segment '{spec}'"))?;
            Ok(segment.with_end(end))
        }
        None => Ok(segment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_segment() {
        let segment = parse_segment("0:10@2/voice").unwrap();
        assert_eq!(segment, SpeedSegment::new(0.0, 2.0, PitchPolicy::Voice).with_end(10.0));
    }

    #[test]
    fn test_parse_open_ended_segment_defaults_pitch() {
        let segment = parse_segment("10@1.5").unwrap();
        assert_eq!(segment.start, 10.0);
        assert_eq!(segment.end, None);
        assert_eq!(segment.pitch, PitchPolicy::HighQuality);

        let segment = parse_segment("4:@0.5/none").unwrap();
        assert_eq!(segment.end, None);
        assert_eq!(segment.pitch, PitchPolicy::None);
    }

    #[test]
    fn test_parse_rejects_malformed_segments() {
        assert!(parse_segment("10").is_err());
        assert!(parse_segment("a@2").is_err());
        assert!(parse_segment("0:b@2").is_err());
        assert!(parse_segment("0@fast").is_err());
        assert!(parse_segment("0@2/robot").is_err());
    }
}
