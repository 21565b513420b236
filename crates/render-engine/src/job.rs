//! Export job state machine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use retime_common::error::{ErrorCode, RetimeResult};
use retime_media_model::request::OutputContainer;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier handed back to the caller when a job starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Idle,
    Preparing,
    Rendering,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: ExportStatus) -> bool {
        use ExportStatus::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Rendering)
                | (Rendering, Completed)
                | (Idle | Preparing | Rendering, Failed)
                | (Idle | Preparing | Rendering, Cancelled)
        )
    }
}

/// Render progress in `[0, 1]`, shared between the renderer and the
/// progress reporter.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell(Arc<AtomicU64>);

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new value; clamped, and never moves backwards.
    pub fn set(&self, value: f64) {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (value > f64::from_bits(bits)).then_some(value.to_bits())
            });
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// One export run.
#[derive(Debug)]
pub struct ExportJob {
    id: JobId,
    output: PathBuf,
    container: OutputContainer,
    status: watch::Sender<ExportStatus>,
    progress: ProgressCell,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

impl ExportJob {
    pub fn new(output: impl Into<PathBuf>, container: OutputContainer) -> Self {
        let (status, _) = watch::channel(ExportStatus::Idle);
        Self {
            id: JobId::new(),
            output: output.into(),
            container,
            status,
            progress: ProgressCell::new(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn container(&self) -> OutputContainer {
        self.container
    }

    pub fn status(&self) -> ExportStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<ExportStatus> {
        self.status.subscribe()
    }

    pub fn progress(&self) -> f64 {
        self.progress.get()
    }

    pub fn progress_cell(&self) -> &ProgressCell {
        &self.progress
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `next` if the transition is legal. Returns whether the
    /// status changed.
    pub fn advance(&self, next: ExportStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if current.can_advance_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(job = %self.id, status = ?next, "Export status changed");
            if next == ExportStatus::Completed {
                self.progress.set(1.0);
            }
        } else {
            tracing::trace!(
                job = %self.id,
                current = ?self.status(),
                requested = ?next,
                "Ignoring illegal export transition"
            );
        }
        changed
    }

    /// Request cancellation. A no-op returning `false` once the job is
    /// terminal; otherwise the signal is latched and observed by whichever
    /// stage runs next.
    pub fn cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        tracing::info!(job = %self.id, "Export cancellation requested");
        self.cancel.cancel();
        true
    }

    /// Settle the job from the outcome of its run.
    pub fn finish<T>(&self, result: &RetimeResult<T>) -> ExportStatus {
        let next = match result {
            Ok(_) => ExportStatus::Completed,
            Err(err) if err.code() == ErrorCode::Cancelled => ExportStatus::Cancelled,
            Err(_) => ExportStatus::Failed,
        };
        self.advance(next);
        self.status()
    }
}
