//! Error taxonomy shared across Retime crates.
//!
//! Every failure the engine surfaces is classified into exactly one
//! [`ErrorCode`]. Stages that know what went wrong raise the matching
//! variant directly; anything else (I/O, JSON, unexpected tool output)
//! falls through to [`ErrorCode::ExportFailed`] with its diagnostic attached.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fixed set of failure codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    FileNotFound,
    UnsupportedFormat,
    ExportFailed,
    InsufficientSpace,
    InvalidParameters,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FileNotFound => "fileNotFound",
            ErrorCode::UnsupportedFormat => "unsupportedFormat",
            ErrorCode::ExportFailed => "exportFailed",
            ErrorCode::InsufficientSpace => "insufficientSpace",
            ErrorCode::InvalidParameters => "invalidParameters",
            ErrorCode::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for Retime operations.
#[derive(Debug, thiserror::Error)]
pub enum RetimeError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    #[error("Insufficient disk space: {message}")]
    InsufficientSpace { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RetimeError.
pub type RetimeResult<T> = Result<T, RetimeError>;

impl RetimeError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: msg.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: msg.into(),
        }
    }

    pub fn export_failed(msg: impl Into<String>) -> Self {
        Self::ExportFailed {
            message: msg.into(),
        }
    }

    /// Build an error from a renderer diagnostic, recognising disk
    /// exhaustion when the tool reports it.
    pub fn from_render_diagnostic(msg: impl Into<String>) -> Self {
        let message = msg.into();
        match classify_diagnostic(&message) {
            ErrorCode::InsufficientSpace => Self::InsufficientSpace { message },
            _ => Self::ExportFailed { message },
        }
    }

    /// The taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RetimeError::FileNotFound { .. } => ErrorCode::FileNotFound,
            RetimeError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            RetimeError::InvalidParameters { .. } => ErrorCode::InvalidParameters,
            RetimeError::ExportFailed { .. } => ErrorCode::ExportFailed,
            RetimeError::InsufficientSpace { .. } => ErrorCode::InsufficientSpace,
            RetimeError::Cancelled => ErrorCode::Cancelled,
            RetimeError::Io(err) if err.kind() == std::io::ErrorKind::StorageFull => {
                ErrorCode::InsufficientSpace
            }
            RetimeError::Io(_) | RetimeError::Json(_) | RetimeError::Other(_) => {
                ErrorCode::ExportFailed
            }
        }
    }

    /// Collapse wrapped errors into their taxonomy variant so nothing
    /// unclassified leaves the engine.
    pub fn normalize(self) -> Self {
        match self {
            RetimeError::Io(err) if err.kind() == std::io::ErrorKind::StorageFull => {
                RetimeError::InsufficientSpace {
                    message: err.to_string(),
                }
            }
            RetimeError::Io(err) => RetimeError::export_failed(err.to_string()),
            RetimeError::Json(err) => RetimeError::export_failed(err.to_string()),
            RetimeError::Other(err) => RetimeError::export_failed(format!("{err:#}")),
            classified => classified,
        }
    }

    /// Caller-facing report (code plus human-readable message).
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Serializable failure shape handed to external callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&RetimeError> for ErrorReport {
    fn from(err: &RetimeError) -> Self {
        err.report()
    }
}

/// Classify a free-form tool diagnostic.
pub fn classify_diagnostic(message: &str) -> ErrorCode {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("no space left on device") || lowered.contains("disk full") {
        ErrorCode::InsufficientSpace
    } else {
        ErrorCode::ExportFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classified_variants_keep_their_code() {
        assert_eq!(
            RetimeError::file_not_found("/missing.mov").code(),
            ErrorCode::FileNotFound
        );
        assert_eq!(
            RetimeError::invalid("speed").code(),
            ErrorCode::InvalidParameters
        );
        assert_eq!(RetimeError::Cancelled.code(), ErrorCode::Cancelled);
    }

    #[test]
    fn test_unclassified_errors_default_to_export_failed() {
        let io = RetimeError::from(std::io::Error::other("pipe closed"));
        assert_eq!(io.code(), ErrorCode::ExportFailed);

        let other = RetimeError::from(anyhow::anyhow!("boom"));
        let normalized = other.normalize();
        assert_eq!(normalized.code(), ErrorCode::ExportFailed);
        assert!(normalized.to_string().contains("boom"));
    }

    #[test]
    fn test_storage_full_maps_to_insufficient_space() {
        let err = RetimeError::from(std::io::Error::from(std::io::ErrorKind::StorageFull));
        assert_eq!(err.code(), ErrorCode::InsufficientSpace);
        assert!(matches!(
            err.normalize(),
            RetimeError::InsufficientSpace { .. }
        ));
    }

    #[test]
    fn test_render_diagnostic_detects_enospc() {
        let err = RetimeError::from_render_diagnostic(
            "av_interleaved_write_frame(): No space left on device",
        );
        assert_eq!(err.code(), ErrorCode::InsufficientSpace);

        let err = RetimeError::from_render_diagnostic("Invalid data found when processing input");
        assert_eq!(err.code(), ErrorCode::ExportFailed);
    }

    #[test]
    fn test_report_serializes_camel_case_code() {
        let report = RetimeError::unsupported("no audio track").report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["code"], "unsupportedFormat");
        assert!(json["message"].as_str().unwrap().contains("no audio track"));
    }
}
