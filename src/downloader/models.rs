// Common data models for the download core

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::errors::DownloadError;
use super::services::Detection;

/// Icon used when a URL does not belong to a known service
pub const DEFAULT_SERVICE_ICON: &str = "🌐";

/// Opaque, process-unique download identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadId(uuid::Uuid);

impl DownloadId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// First eight hex digits, for compact log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user wants out of the URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    /// Audio only, converted to MP3
    Audio,
}

impl MediaKind {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "Video (MP4)",
            Self::Audio => "Audio only (MP3)",
        }
    }
}

/// Upper bound on video resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    /// ≤2160p
    UltraHd,
    /// ≤1080p
    FullHd,
    /// ≤720p
    Hd,
    /// ≤480p
    Sd,
    /// ≤360p
    Low,
    /// No upper bound
    #[default]
    Auto,
}

impl QualityTier {
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::UltraHd => Some(2160),
            Self::FullHd => Some(1080),
            Self::Hd => Some(720),
            Self::Sd => Some(480),
            Self::Low => Some(360),
            Self::Auto => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::UltraHd => "4K Ultra HD",
            Self::FullHd => "1080p Full HD",
            Self::Hd => "720p HD",
            Self::Sd => "480p",
            Self::Low => "360p",
            Self::Auto => "Auto",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Lenient label parsing; anything unrecognised means Auto.
impl FromStr for QualityTier {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let tier = if lower.contains("2160") || lower.contains("4k") {
            Self::UltraHd
        } else if lower.contains("1080") {
            Self::FullHd
        } else if lower.contains("720") {
            Self::Hd
        } else if lower.contains("480") {
            Self::Sd
        } else if lower.contains("360") {
            Self::Low
        } else {
            Self::Auto
        };
        Ok(tier)
    }
}

/// Immutable once submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: MediaKind,
    pub quality: QualityTier,
    pub destination: PathBuf,
}

impl DownloadRequest {
    pub fn video(url: impl Into<String>, quality: QualityTier, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Video,
            quality,
            destination: destination.into(),
        }
    }

    pub fn audio(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Audio,
            quality: QualityTier::Auto,
            destination: destination.into(),
        }
    }

    /// Destination must be an existing directory
    pub fn check_destination(&self) -> Result<(), DownloadError> {
        if self.destination.is_dir() {
            Ok(())
        } else {
            Err(DownloadError::InvalidRequest(format!(
                "destination folder does not exist: {}",
                self.destination.display()
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Stopped,
}

impl DownloadStatus {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Downloading => "Downloading",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Live state of one accepted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub url: String,
    pub status: DownloadStatus,
    /// 0–100
    pub progress: f64,
    pub speed_kbps: f64,
    /// MM:SS when the library reports seconds
    pub eta: Option<String>,
    /// Empty until the library reports one
    pub filename: String,
    pub service: String,
    pub service_icon: String,
    pub kind: MediaKind,
    pub quality: QualityTier,
    pub destination: PathBuf,
    pub error: Option<String>,
}

impl DownloadRecord {
    pub fn new(id: DownloadId, request: &DownloadRequest, detection: &Detection) -> Self {
        Self {
            id,
            url: request.url.clone(),
            status: DownloadStatus::Queued,
            progress: 0.0,
            speed_kbps: 0.0,
            eta: None,
            filename: String::new(),
            service: detection.name().to_string(),
            service_icon: detection.icon().to_string(),
            kind: request.kind,
            quality: request.quality,
            destination: request.destination.clone(),
            error: None,
        }
    }
}

/// Notification sent to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadEvent {
    /// Snapshot after every meaningful change
    Progress(DownloadRecord),
    /// Sent exactly once per download
    Finished {
        id: DownloadId,
        success: bool,
        message: String,
    },
}

impl DownloadEvent {
    pub fn id(&self) -> DownloadId {
        match self {
            Self::Progress(record) => record.id,
            Self::Finished { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_labels_parse() {
        assert_eq!("🏆 4K Ultra HD".parse::<QualityTier>().unwrap(), QualityTier::UltraHd);
        assert_eq!("1080p".parse::<QualityTier>().unwrap(), QualityTier::FullHd);
        assert_eq!("720p HD".parse::<QualityTier>().unwrap(), QualityTier::Hd);
        assert_eq!("480p".parse::<QualityTier>().unwrap(), QualityTier::Sd);
        assert_eq!("💾 360p".parse::<QualityTier>().unwrap(), QualityTier::Low);
        assert_eq!("whatever".parse::<QualityTier>().unwrap(), QualityTier::Auto);
    }

    #[test]
    fn test_quality_heights() {
        assert_eq!(QualityTier::FullHd.max_height(), Some(1080));
        assert!(QualityTier::Auto.max_height().is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DownloadStatus::Queued.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(DownloadStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = DownloadId::new();
        let b = DownloadId::new();
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_destination_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let ok = DownloadRequest::audio("https://soundcloud.com/a/b", dir.path());
        assert!(ok.check_destination().is_ok());

        let missing = DownloadRequest::audio("https://soundcloud.com/a/b", dir.path().join("nope"));
        assert!(missing.check_destination().is_err());
    }
}
