//! Retime CLI: speed-ramp, trim, re-level and inspect media files.
//!
//! Usage:
//!   retime process <INPUT> -o <OUT>   Time-scale by segments or a preset
//!   retime trim <INPUT> -o <OUT>      Cut a time range
//!   retime volume <INPUT> -o <OUT>    Scale audio gain
//!   retime thumbnail <INPUT> -o <OUT> Grab a still frame
//!   retime info <INPUT>               Show media metadata
//!   retime check                      Check for ffmpeg/ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use retime_common::config::EngineConfig;
use retime_render_engine::Engine;

mod commands;

#[derive(Parser)]
#[command(
    name = "retime",
    about = "Non-uniform speed ramps, trims and re-levels for video and audio",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/retime/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time-scale a file by speed segments or a named preset
    Process {
        /// Source file
        input: PathBuf,

        /// Output file (container inferred from the extension)
        #[arg(short, long)]
        output: PathBuf,

        /// Named preset: 2x-lecture, 16x-timelapse, slowmo-sports
        #[arg(long)]
        preset: Option<String>,

        /// Segment as START[:END]@SPEED[/PITCH], e.g. 0:10@2/voice (repeatable)
        #[arg(long = "segment", value_name = "SPEC")]
        segments: Vec<String>,

        /// JSON file holding an array of segments
        #[arg(long)]
        segments_file: Option<PathBuf>,

        /// Which media to keep: video, audio, both
        #[arg(long)]
        format: Option<String>,
    },

    /// Cut [start, end) out of a file
    Trim {
        /// Source file
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Start time (seconds)
        #[arg(long)]
        start: f64,

        /// End time (seconds)
        #[arg(long)]
        end: f64,
    },

    /// Re-export with scaled audio gain
    Volume {
        /// Source file
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Gain multiplier (0 mutes, 1 keeps)
        #[arg(long)]
        volume: f64,
    },

    /// Write a single frame as an image
    Thumbnail {
        /// Source file
        input: PathBuf,

        /// Image path (e.g. thumb.jpg)
        #[arg(short, long)]
        output: PathBuf,

        /// Frame time (seconds)
        #[arg(long, default_value = "0")]
        time: f64,

        /// Maximum width; height follows the aspect ratio
        #[arg(long)]
        max_width: Option<u32>,
    },

    /// Show media metadata
    Info {
        /// Source file
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are usable
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => EngineConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    retime_common::logging::init_logging(&config.logging);

    let engine = || Engine::new(config.clone());
    match cli.command {
        Commands::Process {
            input,
            output,
            preset,
            segments,
            segments_file,
            format,
        } => {
            commands::process::run(
                &engine(),
                input,
                output,
                preset,
                segments,
                segments_file,
                format,
            )
            .await
        }
        Commands::Trim {
            input,
            output,
            start,
            end,
        } => commands::trim::run(&engine(), input, output, start, end).await,
        Commands::Volume {
            input,
            output,
            volume,
        } => commands::volume::run(&engine(), input, output, volume).await,
        Commands::Thumbnail {
            input,
            output,
            time,
            max_width,
        } => commands::thumbnail::run(&engine(), input, output, time, max_width).await,
        Commands::Info { input, json } => commands::info::run(&engine(), input, json).await,
        Commands::Check => commands::check::run(&config).await,
    }
}
