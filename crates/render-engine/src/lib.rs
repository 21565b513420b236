//! Retime Render Engine
//!
//! Builds time-scaled compositions from speed segments and renders them
//! through an external encoder as cancellable, progress-reporting jobs.
//!
//! # Pipeline Architecture
//!
//! ```text
//! request ──► validate (no I/O)
//!                 │
//! input.mov ──► AssetHandle (probe once, cached)
//!                 │
//! segments ───► composition::build ──► ComposedTimeline + MixPlan
//!                                           │
//!                                           ├── filter graph (trim/setpts, atempo | asetrate)
//!                                           ▼
//!                 ExportJob: Idle → Preparing → Rendering → Completed | Failed | Cancelled
//!                                           │                      │
//!                                           ▼                      ▼
//!                                      output.mp4         ProgressEvent stream (… 1.0)
//! ```

pub mod asset;
pub mod composition;
pub mod engine;
pub mod export;
pub mod filter;
pub mod job;
pub mod probe;
pub mod progress;
pub mod tools;

pub use asset::{AssetHandle, MediaProber};
pub use composition::Composition;
pub use engine::{Engine, ExportTicket};
pub use export::{FfmpegBackend, RenderBackend, RenderPlan, SnapshotPlan};
pub use filter::SourceStreams;
pub use job::{ExportJob, ExportStatus, JobId, ProgressCell};
pub use probe::FfprobeProber;
pub use progress::ProgressEvent;
