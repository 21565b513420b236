//! Asset handle: a lazily probed view of one source file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use retime_common::error::{RetimeError, RetimeResult};
use retime_media_model::media::{MediaInfo, TrackInfo, TrackKind};
use tokio::sync::OnceCell;

/// Something that can describe a media file (ffprobe, a test double, ...).
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Probe the file at `path`.
    async fn probe(&self, path: &Path) -> RetimeResult<MediaInfo>;

    /// Prober name.
    fn name(&self) -> &str;
}

/// An opened source asset. Properties are probed on first access and
/// cached for the lifetime of the handle.
pub struct AssetHandle {
    path: PathBuf,
    prober: Arc<dyn MediaProber>,
    info: OnceCell<MediaInfo>,
}

impl std::fmt::Debug for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetHandle")
            .field("path", &self.path)
            .field("prober", &self.prober.name())
            .field("loaded", &self.info.initialized())
            .finish()
    }
}

impl AssetHandle {
    /// Open `path`, failing with `FileNotFound` unless it is an existing,
    /// readable regular file. No probing happens yet.
    pub async fn open(path: impl AsRef<Path>, prober: Arc<dyn MediaProber>) -> RetimeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| RetimeError::file_not_found(&path))?;
        if !metadata.is_file() {
            return Err(RetimeError::file_not_found(&path));
        }
        tokio::fs::File::open(&path)
            .await
            .map_err(|_| RetimeError::file_not_found(&path))?;

        Ok(Self {
            path,
            prober,
            info: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Probed description, loaded on first call.
    pub async fn info(&self) -> RetimeResult<&MediaInfo> {
        self.info
            .get_or_try_init(|| async {
                tracing::debug!(path = %self.path.display(), prober = self.prober.name(), "Probing asset");
                let info = self.prober.probe(&self.path).await.map_err(|e| match e {
                    RetimeError::FileNotFound { .. } | RetimeError::UnsupportedFormat { .. } => e,
                    other => RetimeError::unsupported(format!(
                        "cannot read {}: {other}",
                        self.path.display()
                    )),
                })?;
                if !info.duration_secs.is_finite() || info.duration_secs < 0.0 {
                    return Err(RetimeError::unsupported(format!(
                        "{} reports an invalid duration",
                        self.path.display()
                    )));
                }
                tracing::debug!(
                    duration_secs = info.duration_secs,
                    tracks = info.tracks.len(),
                    "Asset probed"
                );
                Ok::<MediaInfo, RetimeError>(info)
            })
            .await
    }

    /// Duration in seconds.
    pub async fn duration(&self) -> RetimeResult<f64> {
        Ok(self.info().await?.duration_secs)
    }

    /// Tracks of one kind in stream order (possibly empty).
    pub async fn tracks(&self, kind: TrackKind) -> RetimeResult<Vec<TrackInfo>> {
        Ok(self.info().await?.tracks_of(kind).cloned().collect())
    }

    /// Codec identifier of a track.
    pub fn format_of(track: &TrackInfo) -> &str {
        &track.codec
    }

    /// First track of `kind`, or `UnsupportedFormat` if the asset has none.
    pub async fn require(&self, kind: TrackKind) -> RetimeResult<TrackInfo> {
        self.info()
            .await?
            .first(kind)
            .cloned()
            .ok_or_else(|| {
                RetimeError::unsupported(format!(
                    "{} has no {} track",
                    self.path.display(),
                    kind.as_str()
                ))
            })
    }

    /// Media kinds present in the asset; `UnsupportedFormat` if none.
    pub async fn kinds(&self) -> RetimeResult<Vec<TrackKind>> {
        let info = self.info().await?;
        let kinds: Vec<TrackKind> = [TrackKind::Video, TrackKind::Audio]
            .into_iter()
            .filter(|kind| info.has(*kind))
            .collect();
        if kinds.is_empty() {
            return Err(RetimeError::unsupported(format!(
                "{} has no audio or video tracks",
                self.path.display()
            )));
        }
        Ok(kinds)
    }
}
