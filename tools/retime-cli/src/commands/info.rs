//! Show media metadata.

use std::path::PathBuf;

use retime_media_model::request::MetadataRequest;
use retime_render_engine::Engine;

use super::failure;

pub async fn run(engine: &Engine, input: PathBuf, json: bool) -> anyhow::Result<()> {
    let metadata = engine
        .metadata(MetadataRequest {
            input: input.clone(),
        })
        .await
        .map_err(failure)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("File: {}", input.display());
    println!("  Duration: {:.3}s", metadata.duration);
    println!(
        "  Video: {} {}x{} @ {:.3}fps",
        metadata.video_codec, metadata.width, metadata.height, metadata.frame_rate
    );
    match &metadata.audio_codec {
        Some(codec) => println!("  Audio: {codec}"),
        None => println!("  Audio: none"),
    }
    println!("  Size: {} bytes", metadata.file_size);

    Ok(())
}
