// yt-dlp driver - runs the executable as a child process
//
// Progress comes back machine-readably: every hook payload is printed as a
// JSON line prefixed with PROGRESS_MARKER, and the final post-processed path
// is printed once with FINAL_MARKER. stderr is collected; on an unsuccessful
// exit its ERROR lines become the raw error text.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::extractor::{MediaExtractor, MediaInfo, ProgressSender, ProgressTick};
use crate::downloader::format_selector::PostProcess;
use crate::downloader::options::ExtractorOptions;
use crate::downloader::utils::run_output_with_timeout;

pub const PROGRESS_MARKER: &str = "[mdl-progress]";
pub const FINAL_MARKER: &str = "[mdl-final]";

const INFO_TIMEOUT_SECS: u64 = 30;

// Find yt-dlp executable in common paths
pub fn find_ytdlp(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    // Common paths where yt-dlp might be installed
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",          // System installation
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return PathBuf::from(path);
        }
    }

    // Fallback: try to find in PATH
    if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
    }

    // Last resort: hope it's in PATH
    PathBuf::from("yt-dlp")
}

/// Text worth classifying: the ERROR lines, else the last non-empty line.
///
/// WARNING lines routinely mention formats or unavailable clients and must
/// not drive retry decisions.
pub fn error_text(stderr: &str) -> Option<String> {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return Some(errors.join("\n"));
    }

    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// One parsed stdout line
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(ProgressTick),
    Final(String),
    Other,
}

/// Parse a stdout line produced with our progress/print templates
pub fn parse_output_line(line: &str) -> Result<OutputLine, DownloadError> {
    let line = line.trim_end();
    if let Some(json) = line.strip_prefix(PROGRESS_MARKER) {
        let tick = serde_json::from_str::<ProgressTick>(json)
            .map_err(|e| DownloadError::Parse(format!("progress line: {}", e)))?;
        return Ok(OutputLine::Progress(tick));
    }
    if let Some(path) = line.strip_prefix(FINAL_MARKER) {
        return Ok(OutputLine::Final(path.trim().to_string()));
    }
    Ok(OutputLine::Other)
}

/// Render options as yt-dlp command-line arguments, URL last
pub fn build_args(url: &str, options: &ExtractorOptions) -> Vec<String> {
    let net = &options.network;
    let mut args = vec![
        "--newline".to_string(),
        "--progress".to_string(),
        "--no-simulate".to_string(),
        "--progress-template".to_string(),
        format!("download:{}%(progress)j", PROGRESS_MARKER),
        "-O".to_string(),
        format!("after_move:{}%(filepath)s", FINAL_MARKER),
        "-f".to_string(),
        options.format.clone(),
        "-o".to_string(),
        options.output_template.to_string_lossy().into_owned(),
        "--user-agent".to_string(),
        options.user_agent.clone(),
        "--socket-timeout".to_string(),
        net.socket_timeout_secs.to_string(),
        "--retries".to_string(),
        net.retries.to_string(),
        "--fragment-retries".to_string(),
        net.fragment_retries.to_string(),
        "--extractor-retries".to_string(),
        net.extractor_retries.to_string(),
        "--file-access-retries".to_string(),
        net.file_access_retries.to_string(),
        "--sleep-interval".to_string(),
        net.sleep_interval_secs.to_string(),
        "--max-sleep-interval".to_string(),
        net.max_sleep_interval_secs.to_string(),
        "--proxy".to_string(),
        options.proxy.clone().unwrap_or_default(),
    ];

    for (name, value) in &options.headers {
        args.push("--add-header".to_string());
        args.push(format!("{}:{}", name, value));
    }

    for extractor_args in &options.extractor_args {
        args.push("--extractor-args".to_string());
        args.push(extractor_args.clone());
    }

    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if options.skip_certificate_check {
        args.push("--no-check-certificates".to_string());
    }
    if options.geo_bypass {
        args.push("--geo-bypass".to_string());
    }

    match &options.postprocess {
        PostProcess::ExtractAudio { codec, bitrate_kbps } => {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                codec.clone(),
                "--audio-quality".to_string(),
                format!("{}K", bitrate_kbps),
            ]);
        }
        PostProcess::ConvertVideo { container } => {
            args.push("--recode-video".to_string());
            args.push(container.clone());
        }
    }

    args.push(url.to_string());
    args
}

/// Production `MediaExtractor` backed by the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlpCli {
    binary: PathBuf,
}

impl YtDlpCli {
    pub fn new(explicit: Option<&Path>) -> Self {
        Self {
            binary: find_ytdlp(explicit),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl MediaExtractor for YtDlpCli {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        StdCommand::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        progress: ProgressSender,
    ) -> Result<(), DownloadError> {
        let args = build_args(url, options);
        debug!(binary = %self.binary.display(), "Starting yt-dlp");

        // Spawn process with piped stdout for real-time progress
        let mut child = TokioCommand::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DownloadError::ToolNotFound("yt-dlp".to_string()),
                _ => DownloadError::Execution(format!("Failed to start yt-dlp: {}", e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Execution("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Execution("Failed to capture stderr".to_string()))?;

        // Collect stderr in the background
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        // Read stdout and forward progress
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_output_line(&line) {
                Ok(OutputLine::Progress(tick)) => {
                    let _ = progress.send(tick);
                }
                Ok(OutputLine::Final(path)) => {
                    let _ = progress.send(ProgressTick::finished(path));
                }
                Ok(OutputLine::Other) => {
                    if !line.trim().is_empty() {
                        debug!("[yt-dlp] {}", line);
                    }
                }
                Err(e) => warn!("Skipping unreadable yt-dlp output: {}", e),
            }
        }

        // Wait for process to complete
        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(());
        }

        let text = error_text(&stderr_output)
            .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
        Err(DownloadError::Extraction(text))
    }

    async fn info(&self, url: &str) -> Result<MediaInfo, DownloadError> {
        let program = self.binary.display().to_string();
        let args = ["-J", "--skip-download", "--no-playlist", "--no-warnings", url]
            .iter()
            .map(|a| a.to_string())
            .collect();

        let output = run_output_with_timeout(&program, args, INFO_TIMEOUT_SECS).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let text = error_text(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(DownloadError::Extraction(text));
        }
        MediaInfo::from_json(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::downloader::extractor::TickStatus;
    use crate::downloader::models::{DownloadRequest, QualityTier};
    use crate::downloader::services::ServiceKind;

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_build_args_audio() {
        let request = DownloadRequest::audio("https://soundcloud.com/a/b", "/tmp/out");
        let options = ExtractorOptions::for_request(
            &request,
            Some(ServiceKind::SoundCloud),
            &NetworkConfig::default(),
        );
        let args = build_args(&request.url, &options);

        assert_eq!(args.last().unwrap(), "https://soundcloud.com/a/b");
        assert_eq!(args[position(&args, "-f") + 1], "bestaudio/best");
        assert_eq!(args[position(&args, "--audio-format") + 1], "mp3");
        assert_eq!(args[position(&args, "--audio-quality") + 1], "320K");
        assert_eq!(args[position(&args, "--proxy") + 1], "");
        assert_eq!(args[position(&args, "-o") + 1], "/tmp/out/%(title)s.%(ext)s");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--recode-video".to_string()));
    }

    #[test]
    fn test_build_args_video_with_profile() {
        let request = DownloadRequest::video("https://youtu.be/abc", QualityTier::FullHd, "/tmp/out");
        let options = ExtractorOptions::for_request(
            &request,
            Some(ServiceKind::YouTube),
            &NetworkConfig::default(),
        );
        let args = build_args(&request.url, &options);

        assert_eq!(args[position(&args, "--recode-video") + 1], "mp4");
        assert_eq!(args[position(&args, "--socket-timeout") + 1], "30");
        assert_eq!(args[position(&args, "--fragment-retries") + 1], "10");
        assert!(args.contains(&"Referer:https://www.youtube.com/".to_string()));
        assert!(args[position(&args, "--extractor-args") + 1].starts_with("youtube:"));
        assert_eq!(args[position(&args, "--user-agent") + 1], options.user_agent);
    }

    #[test]
    fn test_parse_progress_line() {
        let line = r#"[mdl-progress]{"status":"downloading","downloaded_bytes":512,"total_bytes":2048,"speed":1024.0,"filename":"/tmp/out/Clip.mp4.part"}"#;
        match parse_output_line(line).unwrap() {
            OutputLine::Progress(tick) => {
                assert_eq!(tick.status, TickStatus::Downloading);
                assert_eq!(tick.total_bytes, Some(2048.0));
                assert_eq!(tick.filename.as_deref(), Some("/tmp/out/Clip.mp4.part"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_final_and_other_lines() {
        assert_eq!(
            parse_output_line("[mdl-final]/tmp/out/Song.mp3\n").unwrap(),
            OutputLine::Final("/tmp/out/Song.mp3".to_string())
        );
        assert_eq!(
            parse_output_line("[youtube] abc: Downloading webpage").unwrap(),
            OutputLine::Other
        );
        assert!(parse_output_line("[mdl-progress]{broken").is_err());
    }

    #[test]
    fn test_error_text_ignores_warnings() {
        let stderr = "WARNING: [youtube] abc: Some formats are not available\n\
                      ERROR: [youtube] abc: Connection reset by peer\n";
        assert_eq!(
            error_text(stderr).as_deref(),
            Some("ERROR: [youtube] abc: Connection reset by peer")
        );
        assert_eq!(error_text("first\nlast line\n\n").as_deref(), Some("last line"));
        assert_eq!(error_text("  \n"), None);
    }

    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, stderr_lines: &[&str], stdout: &str, code: i32) -> YtDlpCli {
        use std::os::unix::fs::PermissionsExt;

        let mut script = String::from("#!/bin/sh\n");
        if !stdout.is_empty() {
            script.push_str(&format!("cat <<'JSON'\n{}\nJSON\n", stdout));
        }
        for line in stderr_lines {
            script.push_str(&format!("echo '{}' >&2\n", line));
        }
        script.push_str(&format!("exit {}\n", code));

        let path = dir.join("yt-dlp");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlpCli::new(Some(&path))
    }

    #[cfg(unix)]
    async fn failed_download(cli: &YtDlpCli) -> DownloadError {
        let request = DownloadRequest::video("https://www.youtube.com/watch?v=abc", QualityTier::Auto, "/tmp");
        let options = ExtractorOptions::for_request(&request, Some(ServiceKind::YouTube), &NetworkConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        cli.download(&request.url, &options, tx).await.unwrap_err()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_warning_lines_do_not_drive_classification() {
        use crate::downloader::diagnostics::FailureCategory;

        let dir = tempfile::tempdir().unwrap();
        let cli = fake_ytdlp(
            dir.path(),
            &[
                "WARNING: [youtube] abc: nsig extraction failed, throttling for some formats",
                "ERROR: [youtube] abc: Connection reset by peer",
            ],
            "",
            1,
        );
        let err = failed_download(&cli).await;
        assert_eq!(err.category("YouTube"), FailureCategory::Network);
        assert!(err.is_retryable());

        let dir = tempfile::tempdir().unwrap();
        let cli = fake_ytdlp(
            dir.path(),
            &[
                "WARNING: [youtube] abc: android client is not available",
                "ERROR: Read timed out",
            ],
            "",
            1,
        );
        let err = failed_download(&cli).await;
        assert_eq!(err.category("YouTube"), FailureCategory::Timeout);
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_info_parses_dump_json() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_ytdlp(
            dir.path(),
            &[],
            r#"{"title": "Clip", "uploader": "Someone", "duration": 3725, "view_count": 1500000}"#,
            0,
        );
        let info = cli.info("https://www.youtube.com/watch?v=abc").await.unwrap();
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.duration_label().as_deref(), Some("1:02:05"));
        assert_eq!(info.views_label().as_deref(), Some("1.5M views"));

        let dir = tempfile::tempdir().unwrap();
        let cli = fake_ytdlp(dir.path(), &["ERROR: [youtube] abc: Private video"], "", 1);
        let err = cli.info("https://www.youtube.com/watch?v=abc").await.unwrap_err();
        assert_eq!(err.raw_message(), "ERROR: [youtube] abc: Private video");
    }

    #[test]
    fn test_explicit_binary_wins() {
        let cli = YtDlpCli::new(Some(Path::new("/custom/yt-dlp")));
        assert_eq!(cli.binary(), Path::new("/custom/yt-dlp"));
    }
}
