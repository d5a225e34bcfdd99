// Extraction library seam
//
// The worker never talks to yt-dlp directly. It hands a fully built
// `ExtractorOptions` to a `MediaExtractor` and consumes the `ProgressTick`s
// sent back over a channel, in the order the library produced them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::errors::DownloadError;
use super::options::ExtractorOptions;

/// Phase reported by the library's progress hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickStatus {
    #[default]
    Downloading,
    Finished,
    Error,
    #[serde(other)]
    Other,
}

/// One progress-hook payload. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressTick {
    #[serde(default)]
    pub status: TickStatus,
    pub downloaded_bytes: Option<f64>,
    pub total_bytes: Option<f64>,
    pub total_bytes_estimate: Option<f64>,
    #[serde(rename = "_percent_str")]
    pub percent_str: Option<String>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds
    pub eta: Option<f64>,
    pub filename: Option<String>,
}

impl ProgressTick {
    pub fn downloading(downloaded: f64, total: Option<f64>) -> Self {
        Self {
            status: TickStatus::Downloading,
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            ..Self::default()
        }
    }

    pub fn finished(filename: impl Into<String>) -> Self {
        Self {
            status: TickStatus::Finished,
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    pub fn with_speed(mut self, bytes_per_sec: f64) -> Self {
        self.speed = Some(bytes_per_sec);
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressTick>;

/// Metadata of a media page, looked up without downloading
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub webpage_url: Option<String>,
}

impl MediaInfo {
    /// Parse the library's JSON info dump
    pub fn from_json(bytes: &[u8]) -> Result<Self, DownloadError> {
        serde_json::from_slice(bytes).map_err(|e| DownloadError::Parse(format!("media info: {}", e)))
    }

    /// H:MM:SS, or M:SS under an hour
    pub fn duration_label(&self) -> Option<String> {
        let total = self.duration.filter(|d| d.is_finite() && *d > 0.0)?.round() as u64;
        let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
        if hours > 0 {
            Some(format!("{}:{:02}:{:02}", hours, minutes, seconds))
        } else {
            Some(format!("{}:{:02}", minutes, seconds))
        }
    }

    pub fn views_label(&self) -> Option<String> {
        let views = self.view_count.filter(|v| *v > 0)?;
        Some(if views >= 1_000_000 {
            format!("{:.1}M views", views as f64 / 1_000_000.0)
        } else if views >= 1_000 {
            format!("{:.1}K views", views as f64 / 1_000.0)
        } else {
            format!("{} views", views)
        })
    }
}

/// Trait for extraction library drivers
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Check if this extractor can run at all
    fn is_available(&self) -> bool;

    /// Resolve `url` and write the media as `options` describe.
    ///
    /// Returns the library's raw error text as `DownloadError::Extraction`
    /// on failure; retrying and classification happen in the caller.
    async fn download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        progress: ProgressSender,
    ) -> Result<(), DownloadError>;

    /// Look up page metadata without downloading anything
    async fn info(&self, url: &str) -> Result<MediaInfo, DownloadError>;
}
