use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::utils::run_output_with_timeout;

const LATEST_RELEASE_URL: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";
const UPDATE_TIMEOUT_SECS: u64 = 60;
const VERSION_TIMEOUT_SECS: u64 = 15;
const BREW_PATH: &str = "/opt/homebrew/bin/brew";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
}

impl ToolManager {
    pub fn new(ytdlp_override: Option<&Path>) -> Self {
        Self {
            ytdlp_override: ytdlp_override.map(Path::to_path_buf),
        }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let name = tool_type.as_str().to_string();
        let (path, version) = self.detect_tool(tool_type);

        ToolInfo {
            name,
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    fn detect_tool(&self, tool_type: ToolType) -> (Option<String>, Option<String>) {
        let binary_name = tool_type.as_str();

        if tool_type == ToolType::YtDlp {
            if let Some(path) = &self.ytdlp_override {
                let path = path.display().to_string();
                let version = get_version(&path, tool_type);
                return (version.as_ref().map(|_| path), version);
            }
        }

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                let version = get_version(&path, tool_type);
                return (Some(path), version);
            }
        }

        // 2. Try PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    let version = get_version(&path, tool_type);
                    return (Some(path), version);
                }
            }
        }

        (None, None)
    }
}

fn get_version(path: &str, tool_type: ToolType) -> Option<String> {
    match Command::new(path).arg(tool_type.version_arg()).output() {
        Ok(output) if output.status.success() => {
            let out = String::from_utf8_lossy(&output.stdout);
            // ffmpeg prints a banner; the version is the first line
            out.lines().next().map(|l| l.trim().to_string())
        }
        _ => None,
    }
}

/// yt-dlp versions are dates (2024.03.10), so string order is release order
pub fn needs_update(installed: &str, latest: &str) -> bool {
    let installed = installed.trim().trim_start_matches('v');
    let latest = latest.trim().trim_start_matches('v');
    !latest.is_empty() && installed < latest
}

pub async fn installed_ytdlp_version(binary: &Path) -> Result<String, DownloadError> {
    let program = binary.display().to_string();
    let output = run_output_with_timeout(&program, vec!["--version".to_string()], VERSION_TIMEOUT_SECS).await?;
    if !output.status.success() {
        return Err(DownloadError::Execution(format!(
            "{} --version exited with {}",
            program, output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub async fn latest_ytdlp_version() -> Result<String, DownloadError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent("media-downloader")
        .build()?;

    let release: LatestRelease = client
        .get(LATEST_RELEASE_URL)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(release.tag_name)
}

fn update_command() -> (String, Vec<String>) {
    let to_owned = |args: &[&str]| -> Vec<String> { args.iter().map(|a| a.to_string()).collect() };
    if Path::new(BREW_PATH).exists() {
        (BREW_PATH.to_string(), to_owned(&["upgrade", "yt-dlp"]))
    } else {
        (
            "python3".to_string(),
            to_owned(&["-m", "pip", "install", "--upgrade", "yt-dlp"]),
        )
    }
}

/// Upgrade yt-dlp when GitHub has a newer release; returns whether it ran
pub async fn update_ytdlp_if_outdated(binary: &Path) -> Result<bool, DownloadError> {
    let installed = installed_ytdlp_version(binary).await?;
    let latest = latest_ytdlp_version().await?;
    debug!(installed = %installed, latest = %latest, "yt-dlp version check");

    if !needs_update(&installed, &latest) {
        return Ok(false);
    }

    info!("Updating yt-dlp {} -> {}", installed, latest);
    let (program, args) = update_command();
    let output = run_output_with_timeout(&program, args, UPDATE_TIMEOUT_SECS).await?;
    if output.status.success() {
        info!("yt-dlp updated to {}", latest);
        Ok(true)
    } else {
        Err(DownloadError::Execution(format!(
            "Update failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Fire-and-forget startup check; failures are only logged
pub fn spawn_self_update_check(runtime: &Handle, binary: PathBuf) -> JoinHandle<()> {
    runtime.spawn(async move {
        match update_ytdlp_if_outdated(&binary).await {
            Ok(true) => {}
            Ok(false) => debug!("yt-dlp is up to date"),
            Err(e) => warn!("yt-dlp self-update check failed: {}", e),
        }
    })
}
