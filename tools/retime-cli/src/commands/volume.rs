//! Re-export a file with scaled audio gain.

use std::path::PathBuf;

use retime_media_model::request::VolumeRequest;
use retime_render_engine::Engine;

use super::{failure, follow};

pub async fn run(engine: &Engine, input: PathBuf, output: PathBuf, volume: f64) -> anyhow::Result<()> {
    println!("Adjusting volume: {}", input.display());
    println!("  Gain: {volume}x");
    println!("  Output: {}", output.display());

    let ticket = engine
        .start_volume(VolumeRequest {
            input,
            output,
            volume,
        })
        .map_err(failure)?;
    let written = follow(engine, ticket).await?;

    println!("Volume change complete: {}", written.display());
    Ok(())
}
