//! Grab a single frame.

use std::path::PathBuf;

use retime_media_model::request::ThumbnailRequest;
use retime_render_engine::Engine;

use super::failure;

pub async fn run(
    engine: &Engine,
    input: PathBuf,
    output: PathBuf,
    time: f64,
    max_width: Option<u32>,
) -> anyhow::Result<()> {
    let written = engine
        .thumbnail(ThumbnailRequest {
            input,
            output,
            time,
            max_width,
        })
        .await
        .map_err(failure)?;

    println!("Thumbnail written: {}", written.display());
    Ok(())
}
