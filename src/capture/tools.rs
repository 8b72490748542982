// Locating the external binaries: the decoder (ffmpeg) and yt-dlp

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Install locations checked before PATH (Homebrew, /usr/local, distro)
const WELL_KNOWN_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    Ffmpeg,
    YtDlp,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::YtDlp => "yt-dlp",
        }
    }

    fn binary_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::Ffmpeg => "-version",
            ToolType::YtDlp => "--version",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager {
    search_dirs: Vec<PathBuf>,
}

impl ToolManager {
    /// Well-known install dirs, then every PATH entry
    pub fn new() -> Self {
        let mut search_dirs: Vec<PathBuf> = WELL_KNOWN_DIRS.iter().map(PathBuf::from).collect();
        if let Some(path) = std::env::var_os("PATH") {
            search_dirs.extend(std::env::split_paths(&path));
        }
        Self::with_search_dirs(search_dirs)
    }

    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// First executable candidate for a tool
    pub fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        let binary = tool_type.binary_name();
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&binary))
            .find(|candidate| is_executable(candidate))
    }

    /// Path to spawn: the located binary, or the bare name left to the OS
    pub fn resolve_path(&self, tool_type: ToolType) -> String {
        self.locate(tool_type)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool_type.as_str().to_string())
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path.as_deref().and_then(|p| probe_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: path.is_some(),
            version,
            path: path.map(|p| p.to_string_lossy().into_owned()),
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        [ToolType::Ffmpeg, ToolType::YtDlp]
            .into_iter()
            .map(|tool| self.get_tool_info(tool))
            .collect()
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// First line of `<tool> -version`, e.g. "ffmpeg version 6.1.1 Copyright ..."
fn probe_version(path: &Path, tool_type: ToolType) -> Option<String> {
    let output = Command::new(path).arg(tool_type.version_arg()).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}
