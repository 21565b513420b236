//! Render backends and the ffmpeg implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use retime_common::config::{EncodingDefaults, ToolPaths};
use retime_common::error::{RetimeError, RetimeResult};
use retime_media_model::request::OutputContainer;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::composition::Composition;
use crate::filter::{build_filter_graph, SourceStreams, AUDIO_PAD, VIDEO_PAD};
use crate::job::ProgressCell;
use crate::tools::{find_tool, locate_tool};

/// Lines of renderer stderr kept in failure messages.
const DIAGNOSTIC_TAIL_LINES: usize = 12;

/// Everything a backend needs to render one composition.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub input: PathBuf,
    pub output: PathBuf,
    pub container: OutputContainer,
    pub composition: Composition,
    pub sources: SourceStreams,
    pub encoding: EncodingDefaults,
}

impl RenderPlan {
    /// Output duration the renderer is expected to produce.
    pub fn expected_duration_secs(&self) -> f64 {
        self.composition.duration()
    }
}

/// A single still frame to extract.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPlan {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Container stream index of the video track to grab from.
    pub video_stream: usize,
    pub time: f64,
    pub max_width: Option<u32>,
}

/// Trait for render backends.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Render `plan` to its output, publishing progress into `progress` and
    /// stopping with [`RetimeError::Cancelled`] once `cancel` fires.
    async fn render(
        &self,
        plan: &RenderPlan,
        progress: &ProgressCell,
        cancel: &CancellationToken,
    ) -> RetimeResult<()>;

    /// Write one still frame.
    async fn snapshot(&self, plan: &SnapshotPlan) -> RetimeResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Backend driving the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_path: PathBuf,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    pub fn from_config(tools: &ToolPaths) -> Self {
        Self::new(locate_tool(tools.ffmpeg.as_deref(), "ffmpeg"))
    }

    async fn run_ffmpeg(
        &self,
        args: Vec<String>,
        expected_duration_secs: f64,
        progress: &ProgressCell,
        cancel: &CancellationToken,
    ) -> RetimeResult<()> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RetimeError::export_failed(format!("Failed to start ffmpeg: {e}")))?;

        let start = std::time::Instant::now();
        tracing::info!(
            pid = child.id(),
            args_len = args.len(),
            expected_duration_secs,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RetimeError::export_failed("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RetimeError::export_failed("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = std::time::Instant::now();

        let finished = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break false,
                line = lines.next_line() => {
                    let line = line.map_err(|e| {
                        RetimeError::export_failed(format!("Failed reading ffmpeg progress: {e}"))
                    })?;
                    let Some(line) = line else { break true };
                    let Some((key, value)) = line.trim().split_once('=') else { continue };

                    state.update(key, value);
                    if key == "progress" {
                        progress.set(state.fraction(expected_duration_secs));
                        if state.out_time_secs > last_progress_secs + 0.001 {
                            last_progress_secs = state.out_time_secs;
                            last_progress_wall = std::time::Instant::now();
                        }
                        if last_progress_wall.elapsed().as_secs() >= 10 {
                            tracing::warn!(
                                out_time_secs = state.out_time_secs,
                                elapsed_secs = start.elapsed().as_secs_f64(),
                                "No ffmpeg progress advancement for 10s"
                            );
                            last_progress_wall = std::time::Instant::now();
                        }
                    }
                }
            }
        };

        if !finished {
            tracing::info!(pid = child.id(), "Stopping ffmpeg after cancellation");
            if let Err(err) = child.kill().await {
                tracing::warn!(error = %err, "Failed to kill ffmpeg");
            }
            stderr_task.abort();
            return Err(RetimeError::Cancelled);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| RetimeError::export_failed(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            if cancel.is_cancelled() {
                return Err(RetimeError::Cancelled);
            }
            return Err(RetimeError::from_render_diagnostic(format!(
                "ffmpeg exited with {status}: {}",
                diagnostic_tail(&stderr_output)
            )));
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "ffmpeg finished"
        );
        Ok(())
    }
}

#[async_trait]
impl RenderBackend for FfmpegBackend {
    async fn render(
        &self,
        plan: &RenderPlan,
        progress: &ProgressCell,
        cancel: &CancellationToken,
    ) -> RetimeResult<()> {
        let args = render_args(plan)?;
        self.run_ffmpeg(args, plan.expected_duration_secs(), progress, cancel)
            .await
    }

    async fn snapshot(&self, plan: &SnapshotPlan) -> RetimeResult<()> {
        let args = snapshot_args(plan);
        tracing::debug!(args = ?args, "Running ffmpeg snapshot");
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RetimeError::export_failed(format!("Failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(RetimeError::from_render_diagnostic(format!(
                "ffmpeg snapshot failed ({}): {}",
                output.status,
                diagnostic_tail(&String::from_utf8_lossy(&output.stderr))
            )));
        }
        if !plan.output.exists() {
            return Err(RetimeError::export_failed(format!(
                "ffmpeg produced no frame at {}s",
                plan.time
            )));
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        find_tool(Some(self.ffmpeg_path.as_path()), "ffmpeg").is_some()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Full ffmpeg argument list for a render plan.
pub fn render_args(plan: &RenderPlan) -> RetimeResult<Vec<String>> {
    let graph = build_filter_graph(&plan.composition, &plan.sources);
    if !graph.video && !graph.audio {
        return Err(RetimeError::export_failed("composition has no clips to render"));
    }

    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        path_arg(&plan.input),
        "-filter_complex".to_string(),
        graph.graph,
    ];

    if graph.video {
        args.extend([
            "-map".to_string(),
            format!("[{VIDEO_PAD}]"),
            "-c:v".to_string(),
            plan.encoding.video_codec.clone(),
            "-preset".to_string(),
            plan.encoding.preset.clone(),
            "-crf".to_string(),
            plan.encoding.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
    }
    if graph.audio {
        args.extend([
            "-map".to_string(),
            format!("[{AUDIO_PAD}]"),
            "-c:a".to_string(),
            plan.encoding.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", plan.encoding.audio_bitrate_kbps.max(64)),
        ]);
    }

    if plan.container != OutputContainer::Mkv {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args.extend([
        "-f".to_string(),
        plan.container.muxer().to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        path_arg(&plan.output),
    ]);
    Ok(args)
}

/// ffmpeg argument list for a still frame.
pub fn snapshot_args(plan: &SnapshotPlan) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", plan.time),
        "-i".to_string(),
        path_arg(&plan.input),
        "-map".to_string(),
        format!("0:{}", plan.video_stream),
        "-frames:v".to_string(),
        "1".to_string(),
        "-an".to_string(),
    ];
    if let Some(width) = plan.max_width {
        args.extend(["-vf".to_string(), format!("scale='min(iw,{width})':-2")]);
    }
    args.extend([
        "-q:v".to_string(),
        "2".to_string(),
        path_arg(&plan.output),
    ]);
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn diagnostic_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let skip = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[skip..].join("\n")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            return 1.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    }
}
