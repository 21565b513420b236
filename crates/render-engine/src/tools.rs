//! External tool discovery (`ffmpeg`, `ffprobe`).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use retime_common::config::ToolPaths;
use tokio::process::Command;

/// Availability of one external tool.
#[derive(Debug, Clone)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub fix_instructions: Option<String>,
}

impl ToolCapability {
    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

/// Resolve a tool: the configured path when set, else a `PATH` lookup.
/// Returns `None` when the tool cannot be found.
pub fn find_tool(configured: Option<&Path>, name: &str) -> Option<PathBuf> {
    match configured {
        Some(path) => which::which(path).ok(),
        None => which::which(name).ok(),
    }
}

/// Like [`find_tool`] but falls back to the bare name so a later spawn
/// reports the real error.
pub fn locate_tool(configured: Option<&Path>, name: &str) -> PathBuf {
    find_tool(configured, name).unwrap_or_else(|| {
        let fallback = configured.map(Path::to_path_buf).unwrap_or_else(|| name.into());
        tracing::warn!(tool = name, path = %fallback.display(), "Tool not found on PATH");
        fallback
    })
}

/// Check both media tools and read their version banners.
pub async fn check_tools(paths: &ToolPaths) -> Vec<ToolCapability> {
    vec![
        check_one(
            paths.ffmpeg.as_deref(),
            "ffmpeg",
            "Renders compositions, trims, volume changes and thumbnails",
        )
        .await,
        check_one(
            paths.ffprobe.as_deref(),
            "ffprobe",
            "Reads durations, tracks and codecs of source files",
        )
        .await,
    ]
}

async fn check_one(configured: Option<&Path>, name: &str, description: &str) -> ToolCapability {
    let path = find_tool(configured, name);
    let version = match &path {
        Some(path) => read_version(path).await,
        None => None,
    };
    ToolCapability {
        name: name.to_string(),
        description: description.to_string(),
        fix_instructions: path.is_none().then(|| {
            format!(
                "Install FFmpeg (e.g. `apt install ffmpeg`) or set tools.{name} in {}",
                retime_common::config::config_file_path().display()
            )
        }),
        path,
        version,
    }
}

async fn read_version(path: &Path) -> Option<String> {
    let output = Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}
