//! Engine facade: validates requests, runs export jobs, and tracks them for
//! cancellation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use retime_common::config::EngineConfig;
use retime_common::error::{RetimeError, RetimeResult};
use retime_media_model::media::{MediaMetadata, TrackKind};
use retime_media_model::request::{
    MetadataRequest, OutputContainer, OutputFormat, ProcessRequest, ThumbnailRequest, TrimRequest,
    VolumeRequest,
};
use retime_media_model::segment::ResolvedSegments;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::asset::{AssetHandle, MediaProber};
use crate::composition::{self, Composition};
use crate::export::{FfmpegBackend, RenderBackend, RenderPlan, SnapshotPlan};
use crate::filter::SourceStreams;
use crate::job::{ExportJob, ExportStatus, JobId};
use crate::probe::FfprobeProber;
use crate::progress::{spawn_reporter, ProgressEvent};

/// Sample rate assumed when the prober reports none.
const FALLBACK_SAMPLE_RATE: u32 = 48_000;

/// Distance kept from the end of the asset when grabbing a still, so the
/// seek lands on a decodable frame.
const SNAPSHOT_TAIL_SECS: f64 = 0.04;

/// What an export job renders.
#[derive(Debug, Clone)]
enum ExportOperation {
    Process {
        segments: ResolvedSegments,
        format: OutputFormat,
    },
    Trim {
        start: f64,
        end: f64,
        format: OutputFormat,
    },
    Volume {
        gain: f64,
        format: OutputFormat,
    },
}

impl ExportOperation {
    fn name(&self) -> &'static str {
        match self {
            ExportOperation::Process { .. } => "process",
            ExportOperation::Trim { .. } => "trim",
            ExportOperation::Volume { .. } => "volume",
        }
    }
}

/// Handle to a started export.
#[derive(Debug)]
pub struct ExportTicket {
    id: JobId,
    job: Arc<ExportJob>,
    /// Progress samples followed by exactly one final `1.0`.
    pub progress: mpsc::Receiver<ProgressEvent>,
    handle: JoinHandle<RetimeResult<PathBuf>>,
}

impl ExportTicket {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job(&self) -> &Arc<ExportJob> {
        &self.job
    }

    /// Request cancellation of this export.
    pub fn cancel(&self) -> bool {
        self.job.cancel()
    }

    /// Wait for the export to settle and return the output path.
    pub async fn finish(self) -> RetimeResult<PathBuf> {
        match self.handle.await {
            Ok(result) => result,
            Err(join) => Err(RetimeError::from(anyhow::Error::new(join)).normalize()),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    backend: Arc<dyn RenderBackend>,
    prober: Arc<dyn MediaProber>,
    jobs: Mutex<HashMap<JobId, Arc<ExportJob>>>,
    latest: Mutex<Option<JobId>>,
    permits: Option<Arc<Semaphore>>,
}

impl EngineInner {
    fn retire(&self, id: JobId) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.remove(&id);
        }
    }
}

/// Timeline composition and export engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.inner.backend.name())
            .field("prober", &self.inner.prober.name())
            .field("active_jobs", &self.active_jobs())
            .finish()
    }
}

impl Engine {
    /// Engine backed by the `ffmpeg` and `ffprobe` executables.
    pub fn new(config: EngineConfig) -> Self {
        let backend = Arc::new(FfmpegBackend::from_config(&config.tools));
        let prober = Arc::new(FfprobeProber::from_config(&config.tools));
        Self::with_backends(config, backend, prober)
    }

    pub fn with_backends(
        config: EngineConfig,
        backend: Arc<dyn RenderBackend>,
        prober: Arc<dyn MediaProber>,
    ) -> Self {
        let permits = config
            .max_concurrent_exports
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        tracing::debug!(
            backend = backend.name(),
            prober = prober.name(),
            max_concurrent_exports = ?config.max_concurrent_exports,
            "Engine created"
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                backend,
                prober,
                jobs: Mutex::new(HashMap::new()),
                latest: Mutex::new(None),
                permits,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start a segment-driven export. Parameter errors are returned here,
    /// before any file is touched.
    pub fn start_process(&self, request: ProcessRequest) -> RetimeResult<ExportTicket> {
        let validated = request.validate()?;
        Ok(self.spawn_export(
            request.input,
            request.output,
            validated.container,
            ExportOperation::Process {
                segments: validated.params,
                format: validated.format,
            },
        ))
    }

    /// Run a segment-driven export to completion.
    pub async fn process(&self, request: ProcessRequest) -> RetimeResult<PathBuf> {
        self.start_process(request)?.finish().await
    }

    pub fn start_trim(&self, request: TrimRequest) -> RetimeResult<ExportTicket> {
        let validated = request.validate()?;
        let (start, end) = validated.params;
        Ok(self.spawn_export(
            request.input,
            request.output,
            validated.container,
            ExportOperation::Trim {
                start,
                end,
                format: validated.format,
            },
        ))
    }

    /// Cut `[start_time, end_time)` out of the input.
    pub async fn trim(&self, request: TrimRequest) -> RetimeResult<PathBuf> {
        self.start_trim(request)?.finish().await
    }

    pub fn start_volume(&self, request: VolumeRequest) -> RetimeResult<ExportTicket> {
        let validated = request.validate()?;
        Ok(self.spawn_export(
            request.input,
            request.output,
            validated.container,
            ExportOperation::Volume {
                gain: validated.params,
                format: validated.format,
            },
        ))
    }

    /// Re-export the input with its audio gain scaled.
    pub async fn adjust_volume(&self, request: VolumeRequest) -> RetimeResult<PathBuf> {
        self.start_volume(request)?.finish().await
    }

    /// Write a single still frame. Runs inline: no job, no progress.
    pub async fn thumbnail(&self, request: ThumbnailRequest) -> RetimeResult<PathBuf> {
        self.snapshot(request).await.map_err(RetimeError::normalize)
    }

    async fn snapshot(&self, request: ThumbnailRequest) -> RetimeResult<PathBuf> {
        request.validate()?;
        let asset = AssetHandle::open(&request.input, self.inner.prober.clone()).await?;
        let video = asset.require(TrackKind::Video).await?;
        ensure_output_is_not_input(&request.input, &request.output).await?;
        let duration = asset.duration().await?;
        if request.time > duration {
            return Err(RetimeError::invalid(format!(
                "thumbnail time {}s is past the end of the asset ({duration}s)",
                request.time
            )));
        }

        let time = request.time.min((duration - SNAPSHOT_TAIL_SECS).max(0.0));
        prepare_output(&request.output).await?;
        let plan = SnapshotPlan {
            input: request.input,
            output: request.output,
            video_stream: video.index,
            time,
            max_width: request.max_width,
        };
        tracing::info!(
            input = %plan.input.display(),
            output = %plan.output.display(),
            time,
            "Capturing thumbnail"
        );
        self.inner.backend.snapshot(&plan).await?;
        Ok(plan.output)
    }

    /// Describe the input. Requires a video track.
    pub async fn metadata(&self, request: MetadataRequest) -> RetimeResult<MediaMetadata> {
        self.describe(&request.input)
            .await
            .map_err(RetimeError::normalize)
    }

    async fn describe(&self, input: &Path) -> RetimeResult<MediaMetadata> {
        let asset = AssetHandle::open(input, self.inner.prober.clone()).await?;
        let video = asset.require(TrackKind::Video).await?;
        let info = asset.info().await?;
        Ok(MediaMetadata {
            duration: info.duration_secs,
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
            frame_rate: video.frame_rate.unwrap_or(0.0),
            video_codec: AssetHandle::format_of(&video).to_string(),
            audio_codec: info
                .first(TrackKind::Audio)
                .map(|track| AssetHandle::format_of(track).to_string()),
            file_size: info.file_size,
        })
    }

    /// Cancel a job by id. `false` when the job is unknown or already
    /// terminal.
    pub fn cancel(&self, id: JobId) -> bool {
        let job = self
            .inner
            .jobs
            .lock()
            .ok()
            .and_then(|jobs| jobs.get(&id).cloned());
        job.map(|job| job.cancel()).unwrap_or(false)
    }

    /// Cancel the most recently started job.
    pub fn cancel_latest(&self) -> bool {
        let latest = self.inner.latest.lock().ok().and_then(|latest| *latest);
        latest.map(|id| self.cancel(id)).unwrap_or(false)
    }

    /// Status of a job that has not yet been retired.
    pub fn status(&self, id: JobId) -> Option<ExportStatus> {
        self.inner
            .jobs
            .lock()
            .ok()
            .and_then(|jobs| jobs.get(&id).map(|job| job.status()))
    }

    /// Number of jobs that have not reached a terminal state.
    pub fn active_jobs(&self) -> usize {
        self.inner.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    fn spawn_export(
        &self,
        input: PathBuf,
        output: PathBuf,
        container: OutputContainer,
        operation: ExportOperation,
    ) -> ExportTicket {
        let job = Arc::new(ExportJob::new(output, container));
        let id = job.id();

        if let Ok(mut jobs) = self.inner.jobs.lock() {
            jobs.insert(id, job.clone());
        }
        if let Ok(mut latest) = self.inner.latest.lock() {
            *latest = Some(id);
        }

        tracing::info!(
            job = %id,
            operation = operation.name(),
            input = %input.display(),
            output = %job.output().display(),
            "Starting export"
        );

        let progress_config = &self.inner.config.progress;
        let (progress, _reporter) = spawn_reporter(
            job.clone(),
            progress_config.interval(),
            progress_config.channel_capacity,
        );

        let inner = self.inner.clone();
        let task_job = job.clone();
        let handle = tokio::spawn(async move {
            let result = run_export(&inner, &task_job, &input, operation)
                .await
                .map_err(RetimeError::normalize);
            let status = task_job.finish(&result);
            match &result {
                Ok(path) => tracing::info!(
                    job = %id,
                    output = %path.display(),
                    elapsed_ms = (chrono::Utc::now() - task_job.started_at()).num_milliseconds(),
                    "Export completed"
                ),
                Err(err) => tracing::warn!(
                    job = %id,
                    status = ?status,
                    code = %err.code(),
                    error = %err,
                    "Export did not complete"
                ),
            }
            inner.retire(id);
            result
        });

        ExportTicket {
            id,
            job,
            progress,
            handle,
        }
    }
}

async fn run_export(
    inner: &EngineInner,
    job: &ExportJob,
    input: &Path,
    operation: ExportOperation,
) -> RetimeResult<PathBuf> {
    let _permit = match &inner.permits {
        Some(permits) => {
            tracing::debug!(job = %job.id(), available = permits.available_permits(), "Waiting for export slot");
            let permit = tokio::select! {
                biased;
                _ = job.cancel_token().cancelled() => return Err(RetimeError::Cancelled),
                permit = permits.clone().acquire_owned() => permit,
            };
            Some(permit.map_err(|_| RetimeError::export_failed("export slots closed"))?)
        }
        None => None,
    };

    if job.is_cancel_requested() {
        return Err(RetimeError::Cancelled);
    }
    job.advance(ExportStatus::Preparing);

    let asset = AssetHandle::open(input, inner.prober.clone()).await?;
    ensure_output_is_not_input(input, job.output()).await?;
    let composition = compose_for(inner, &asset, operation).await?;
    if composition.timeline.is_empty() {
        return Err(RetimeError::invalid(format!(
            "nothing to render: {} selects no media",
            input.display()
        )));
    }

    let sources = source_streams(&asset, &composition).await?;

    if job.is_cancel_requested() {
        return Err(RetimeError::Cancelled);
    }
    if !inner.backend.is_available() {
        return Err(RetimeError::export_failed(format!(
            "render backend '{}' is not available",
            inner.backend.name()
        )));
    }

    prepare_output(job.output()).await?;

    let plan = RenderPlan {
        input: input.to_path_buf(),
        output: job.output().to_path_buf(),
        container: job.container(),
        composition,
        sources,
        encoding: inner.config.encoding.clone(),
    };
    tracing::info!(
        job = %job.id(),
        backend = inner.backend.name(),
        expected_duration_secs = plan.expected_duration_secs(),
        "Rendering"
    );
    job.advance(ExportStatus::Rendering);

    let result = inner
        .backend
        .render(&plan, job.progress_cell(), job.cancel_token())
        .await;
    if result.is_err() {
        discard_partial_output(job.output()).await;
    }
    result.map(|_| plan.output)
}

async fn compose_for(
    inner: &EngineInner,
    asset: &AssetHandle,
    operation: ExportOperation,
) -> RetimeResult<Composition> {
    match operation {
        ExportOperation::Process { segments, format } => {
            composition::build(asset, &segments, format, inner.config.pitch_binding).await
        }
        ExportOperation::Trim { start, end, format } => {
            let duration = asset.duration().await?;
            let kinds = composition::select_kinds(asset, format).await?;
            composition::compose_trim(duration, &kinds, start, end)
        }
        ExportOperation::Volume { gain, format } => {
            asset.require(TrackKind::Audio).await?;
            let duration = asset.duration().await?;
            let kinds = composition::select_kinds(asset, format).await?;
            Ok(composition::compose_identity(duration, &kinds, gain))
        }
    }
}

/// Streams of `asset` feeding each composed track.
async fn source_streams(asset: &AssetHandle, composition: &Composition) -> RetimeResult<SourceStreams> {
    let timeline = &composition.timeline;
    let video = match timeline.track(TrackKind::Video) {
        Some(_) => asset.require(TrackKind::Video).await?.index,
        None => 0,
    };
    let (audio, sample_rate) = match timeline.track(TrackKind::Audio) {
        Some(_) => {
            let track = asset.require(TrackKind::Audio).await?;
            (track.index, track.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE))
        }
        None => (0, FALLBACK_SAMPLE_RATE),
    };
    Ok(SourceStreams {
        video,
        audio,
        sample_rate,
    })
}

/// Fail when `output` already exists and is the same file as `input`, under
/// any spelling of either path.
async fn ensure_output_is_not_input(input: &Path, output: &Path) -> RetimeResult<()> {
    let (Ok(input), Ok(output)) = (
        tokio::fs::canonicalize(input).await,
        tokio::fs::canonicalize(output).await,
    ) else {
        return Ok(());
    };
    if input == output {
        return Err(RetimeError::invalid(format!(
            "output {} would overwrite the input",
            output.display()
        )));
    }
    Ok(())
}

/// Remove any existing file at `output` and make sure its directory exists.
async fn prepare_output(output: &Path) -> RetimeResult<()> {
    match tokio::fs::remove_file(output).await {
        Ok(()) => tracing::debug!(path = %output.display(), "Removed existing output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn discard_partial_output(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => tracing::debug!(path = %output.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %output.display(), error = %err, "Failed to remove partial output")
        }
    }
}
