// Downloader module - validation, detection and the download pipeline

pub mod diagnostics;
pub mod errors;
pub mod extractor;
pub mod format_selector;
pub mod manager;
pub mod models;
pub mod options;
pub mod registry;
pub mod services;
pub mod tools;
pub mod utils;
pub mod validator;
pub mod worker;

pub use diagnostics::FailureCategory;
pub use errors::{ConfigError, DownloadError};
pub use extractor::{MediaExtractor, MediaInfo, ProgressSender, ProgressTick, TickStatus};
pub use manager::{DownloadManager, EventReceiver};
pub use models::{
    DownloadEvent, DownloadId, DownloadRecord, DownloadRequest, DownloadStatus, MediaKind,
    QualityTier,
};
pub use options::ExtractorOptions;
pub use services::{detect, Detection, ServiceDetector, ServiceKind};
pub use validator::{check_url_accessibility, validate};
