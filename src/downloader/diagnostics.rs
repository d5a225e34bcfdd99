// Failure diagnostics - maps raw extractor output onto user-facing categories
//
// Matching is substring based and best-effort. The order of the checks in
// `FailureCategory::classify` is significant: the first match wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error text fragments after which another attempt is pointless
const NON_RETRYABLE_MARKERS: &[&str] = &[
    "private",
    "not available",
    "removed",
    "deleted",
    "copyright",
    "blocked",
    "404",
    "forbidden",
    "not found",
];

/// User-facing failure categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCategory {
    /// A media-processing tool (ffmpeg, yt-dlp) is missing
    MissingTool(String),

    /// Requested format is not offered by the service
    FormatUnsupported(String),

    /// Content not found or removed
    NotFound,

    /// Content is private
    Private,

    /// yt-dlp is too old for the site's current player
    OutdatedExtractor,

    /// Connection or transport failure
    Network,

    /// URL still contained control characters
    ControlCharacters,

    /// URL rejected by the extractor
    InvalidUrl,

    /// Socket or extractor timeout
    Timeout,

    /// Nothing matched; raw text is shown as-is
    Other(String),
}

impl FailureCategory {
    /// Classify raw error text. `service` is only used for the format message.
    pub fn classify(raw: &str, service: &str) -> Self {
        let lower = raw.to_lowercase();

        if lower.contains("ffmpeg") || lower.contains("ffprobe") {
            return Self::MissingTool("ffmpeg".to_string());
        }

        if lower.contains("format") {
            return Self::FormatUnsupported(service.to_string());
        }

        if lower.contains("404") || lower.contains("not found") {
            return Self::NotFound;
        }

        if lower.contains("private") {
            return Self::Private;
        }

        if lower.contains("player response") {
            return Self::OutdatedExtractor;
        }

        if lower.contains("connection") || lower.contains("transport") {
            return Self::Network;
        }

        // yt-dlp spells this one with a fixed case
        if raw.contains("control characters") {
            return Self::ControlCharacters;
        }

        if lower.contains("invalidurl") {
            return Self::InvalidUrl;
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::Timeout;
        }

        Self::Other(raw.trim().to_string())
    }

    /// Message shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingTool(tool) if tool == "ffmpeg" => {
                "FFmpeg is required to convert audio/video. Install it and try again".to_string()
            }
            Self::MissingTool(tool) => format!("{} is required. Install it and try again", tool),
            Self::FormatUnsupported(service) => {
                format!("Format is not supported for {}", service)
            }
            Self::NotFound => "Content not found or unavailable".to_string(),
            Self::Private => "Content is private".to_string(),
            Self::OutdatedExtractor => {
                "Outdated yt-dlp version. Upgrade with: pip install --upgrade yt-dlp".to_string()
            }
            Self::Network => {
                "Network connection problem. Check your internet connection".to_string()
            }
            Self::ControlCharacters => {
                "Invalid URL. Check the link for stray characters".to_string()
            }
            Self::InvalidUrl => "Invalid URL format. Check that the link is correct".to_string(),
            Self::Timeout => "Request timed out. Try again later".to_string(),
            Self::Other(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

/// True when the error text names a permanent condition
pub fn is_non_retryable(error: &str) -> bool {
    let lower = error.to_lowercase();
    NON_RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
}
