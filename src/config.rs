// Application configuration
//
// Defaults, overlaid by an optional JSON file, overlaid by environment
// variables. Example: export YTDLP_PATH="/path/to/venv/bin/yt-dlp"

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::errors::ConfigError;

pub const CONFIG_PATH_ENV: &str = "MEDIA_DOWNLOADER_CONFIG";
pub const FOLDER_ENV: &str = "MEDIA_DOWNLOADER_FOLDER";
pub const YTDLP_PATH_ENV: &str = "YTDLP_PATH";
pub const MAX_CONCURRENT_ENV: &str = "MEDIA_DOWNLOADER_MAX_CONCURRENT";

const APP_DIR_NAME: &str = "media-downloader";

/// Inclusive random delay range in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Uniform sample; a degenerate range yields its lower bound
    pub fn sample(&self) -> Duration {
        let (lo, hi) = (self.min_ms.min(self.max_ms), self.min_ms.max(self.max_ms));
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Application-level retry policy (on top of yt-dlp's own retries)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Politeness delay before the first network attempt
    pub preflight_delay: DelayRange,
    /// Base back-off, multiplied by the attempt number
    pub backoff: DelayRange,
}

impl RetryPolicy {
    /// No delays at all; used by tests and scripted runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            preflight_delay: DelayRange::ZERO,
            backoff: DelayRange::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the given (1-based) failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.sample() * attempt.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            preflight_delay: DelayRange::new(500, 2000),
            backoff: DelayRange::new(3000, 8000),
        }
    }
}

/// Limits handed to the extraction library for its own inner retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub socket_timeout_secs: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_retries: u32,
    pub file_access_retries: u32,
    pub sleep_interval_secs: u32,
    pub max_sleep_interval_secs: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 30,
            retries: 5,
            fragment_retries: 10,
            extractor_retries: 3,
            file_access_retries: 3,
            sleep_interval_secs: 1,
            max_sleep_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root folder, created when the manager starts
    pub download_folder: PathBuf,
    /// Explicit yt-dlp executable; searched for when unset
    pub ytdlp_path: Option<PathBuf>,
    /// Background yt-dlp upgrade check at startup
    pub self_update_on_start: bool,
    /// Cap on simultaneous downloads; unbounded when unset
    pub max_concurrent_downloads: Option<usize>,
    pub retry: RetryPolicy,
    pub network: NetworkConfig,
    /// Daily-rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_folder: default_download_folder(),
            ytdlp_path: None,
            self_update_on_start: true,
            max_concurrent_downloads: None,
            retry: RetryPolicy::default(),
            network: NetworkConfig::default(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from the configured file (if any) and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(folder) = lookup(FOLDER_ENV).filter(|v| !v.trim().is_empty()) {
            self.download_folder = PathBuf::from(folder.trim());
        }

        if let Some(path) = lookup(YTDLP_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.ytdlp_path = Some(PathBuf::from(path.trim()));
        }

        if let Some(raw) = lookup(MAX_CONCURRENT_ENV) {
            let raw = raw.trim();
            self.max_concurrent_downloads = match raw {
                "" | "0" | "unbounded" => None,
                value => Some(value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                    key: MAX_CONCURRENT_ENV.to_string(),
                    value: value.to_string(),
                })?),
            };
        }

        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.json"))
}

fn default_download_folder() -> PathBuf {
    dirs::download_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.network.socket_timeout_secs, 30);
        assert!(config.max_concurrent_downloads.is_none());
        assert!(config.self_update_on_start);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "download_folder": "/tmp/media", "retry": { "max_attempts": 5 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.download_folder, PathBuf::from("/tmp/media"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, DelayRange::new(3000, 8000));
        assert_eq!(config.network.fragment_retries, 10);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (FOLDER_ENV, "/data/downloads"),
            (YTDLP_PATH_ENV, "/opt/yt-dlp"),
            (MAX_CONCURRENT_ENV, "4"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.download_folder, PathBuf::from("/data/downloads"));
        assert_eq!(config.ytdlp_path, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(config.max_concurrent_downloads, Some(4));
    }

    #[test]
    fn test_bad_concurrency_value() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == MAX_CONCURRENT_ENV).then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_delay_sampling() {
        assert_eq!(DelayRange::ZERO.sample(), Duration::ZERO);
        let range = DelayRange::new(10, 20);
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }

        let policy = RetryPolicy {
            backoff: DelayRange::new(100, 100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for(3), Duration::from_millis(300));
    }
}
