// Error types for the download core

use thiserror::Error;

use super::diagnostics::FailureCategory;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// yt-dlp (or a tool it needs) is not installed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The extraction library ran and reported failure; holds its raw text
    #[error("{0}")]
    Extraction(String),

    /// A child process could not be started or awaited
    #[error("Execution error: {0}")]
    Execution(String),

    /// Progress or metadata output could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Local timeout while waiting for a helper command
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// The request itself cannot be processed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl DownloadError {
    /// Text the failure categories are matched against.
    pub fn raw_message(&self) -> String {
        match self {
            Self::Extraction(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ToolNotFound(_) | Self::InvalidRequest(_) => false,
            other => !super::diagnostics::is_non_retryable(&other.raw_message()),
        }
    }

    /// Map this error onto the user-facing taxonomy.
    pub fn category(&self, service: &str) -> FailureCategory {
        match self {
            Self::ToolNotFound(tool) => FailureCategory::MissingTool(tool.clone()),
            other => FailureCategory::classify(&other.raw_message(), service),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_not_retryable() {
        let err = DownloadError::ToolNotFound("yt-dlp".to_string());
        assert!(!err.is_retryable());
        assert_eq!(
            err.category("YouTube"),
            FailureCategory::MissingTool("yt-dlp".to_string())
        );
    }

    #[test]
    fn test_extraction_text_drives_retryability() {
        let private = DownloadError::Extraction("ERROR: Private video".to_string());
        assert!(!private.is_retryable());

        let flaky = DownloadError::Extraction("Connection reset by peer".to_string());
        assert!(flaky.is_retryable());
    }

    #[test]
    fn test_raw_message_has_no_prefix_for_extraction() {
        let err = DownloadError::Extraction("ERROR: boom".to_string());
        assert_eq!(err.raw_message(), "ERROR: boom");
    }
}
