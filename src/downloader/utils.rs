// Helper functions shared by the worker, the yt-dlp driver and tool checks

use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use super::errors::DownloadError;

/// Suffixes yt-dlp puts on files it is still writing
const IN_PROGRESS_SUFFIXES: &[&str] = &[".part", ".ytdl"];

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DownloadError::ToolNotFound(program.to_string()),
            _ => DownloadError::Execution(format!("Failed to start {}: {}", program, e)),
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res?;
            let stdout = stdout_task
                .await
                .map_err(|e| DownloadError::Execution(format!("stdout task failed: {}", e)))??;
            let stderr = stderr_task
                .await
                .map_err(|e| DownloadError::Execution(format!("stderr task failed: {}", e)))??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::Timeout(timeout_secs))
        }
    }
}

/// Strip control characters (below U+0020) and surrounding whitespace
pub fn clean_url(url: &str) -> String {
    url.chars()
        .filter(|c| (*c as u32) >= 32 && !matches!(c, '\r' | '\n' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Base name of a reported file with in-progress suffixes removed
pub fn display_filename(reported: &str) -> String {
    let mut name = Path::new(reported)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| reported.to_string());

    while let Some(stripped) = IN_PROGRESS_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
    {
        name = stripped.to_string();
    }
    name
}

/// Replace the extension unless it already matches (case-insensitive)
pub fn with_extension(filename: &str, extension: &str) -> String {
    if filename.is_empty() {
        return String::new();
    }
    let path = Path::new(filename);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(extension) => filename.to_string(),
        _ => path.with_extension(extension).to_string_lossy().into_owned(),
    }
}

/// Name for a finished download the library never reported a file for:
/// last path segment of the URL, else its host, with `extension`
pub fn fallback_filename(url: &str, extension: &str) -> String {
    let stem = url::Url::parse(url).ok().and_then(|parsed| {
        let segment = parsed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string));
        segment.or_else(|| parsed.host_str().map(str::to_string))
    });
    with_extension(stem.as_deref().unwrap_or("download"), extension)
}

/// Seconds as MM:SS (minutes are not wrapped into hours)
pub fn format_eta(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let total = seconds.round() as u64;
    Some(format!("{:02}:{:02}", total / 60, total % 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_filename() {
        assert_eq!(fallback_filename("https://youtu.be/dQw4w9WgXcQ", "mp3"), "dQw4w9WgXcQ.mp3");
        assert_eq!(fallback_filename("https://example.com/media/clip.webm/", "mp4"), "clip.mp4");
        assert_eq!(fallback_filename("https://vimeo.com", "mp4"), "vimeo.mp4");
        assert_eq!(fallback_filename("not a url", "mp3"), "download.mp3");
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(
            clean_url("  https://youtu.be/abc\r\n\t\u{7}  "),
            "https://youtu.be/abc"
        );
        assert_eq!(clean_url("https://x.com/a\u{0}b"), "https://x.com/ab");
    }

    #[test]
    fn test_display_filename() {
        assert_eq!(display_filename("/tmp/out/Clip.mp4.part"), "Clip.mp4");
        assert_eq!(display_filename("Clip.webm.ytdl"), "Clip.webm");
        assert_eq!(display_filename("/tmp/out/Song.m4a"), "Song.m4a");
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("Song.m4a", "mp3"), "Song.mp3");
        assert_eq!(with_extension("Song.MP3", "mp3"), "Song.MP3");
        assert_eq!(with_extension("Song", "mp3"), "Song.mp3");
        assert_eq!(with_extension("", "mp3"), "");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(0.0).as_deref(), Some("00:00"));
        assert_eq!(format_eta(75.0).as_deref(), Some("01:15"));
        assert_eq!(format_eta(3725.0).as_deref(), Some("62:05"));
        assert_eq!(format_eta(-1.0), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let result = run_output_with_timeout("definitely-not-installed-tool-xyz", vec![], 5).await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(_))));
    }
}
