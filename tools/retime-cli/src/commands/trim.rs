//! Cut a time range out of a file.

use std::path::PathBuf;

use retime_media_model::request::TrimRequest;
use retime_render_engine::Engine;

use super::{failure, follow};

pub async fn run(
    engine: &Engine,
    input: PathBuf,
    output: PathBuf,
    start: f64,
    end: f64,
) -> anyhow::Result<()> {
    println!("Trimming: {}", input.display());
    println!("  Range: {start:.3}s - {end:.3}s");
    println!("  Output: {}", output.display());

    let ticket = engine
        .start_trim(TrimRequest {
            input,
            output,
            start_time: start,
            end_time: end,
        })
        .map_err(failure)?;
    let written = follow(engine, ticket).await?;

    println!("Trim complete: {}", written.display());
    Ok(())
}
