// Download manager - accepts requests and owns the active downloads table
//
// submit() never blocks: it records the request as Queued, spawns a worker
// task and returns the id. Every state change reaches the caller through the
// event receiver returned by `new`.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use super::errors::DownloadError;
use super::extractor::{MediaExtractor, MediaInfo};
use super::models::{DownloadEvent, DownloadId, DownloadRecord, DownloadRequest, QualityTier};
use super::registry::ActiveDownloads;
use super::services::ServiceDetector;
use super::tools::spawn_self_update_check;
use super::utils::clean_url;
use super::worker::{DownloadWorker, StopSignal, WorkerContext};
use crate::config::AppConfig;
use crate::ytdlp::YtDlpCli;

pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

pub struct DownloadManager {
    config: AppConfig,
    detector: ServiceDetector,
    extractor: Arc<dyn MediaExtractor>,
    active: Arc<ActiveDownloads>,
    stop: StopSignal,
    permits: Option<Arc<Semaphore>>,
    runtime: Handle,
}

impl DownloadManager {
    /// Manager backed by the yt-dlp executable
    pub fn new(config: AppConfig) -> Result<(Self, EventReceiver), DownloadError> {
        let cli = YtDlpCli::new(config.ytdlp_path.as_deref());
        let binary = cli.binary().to_path_buf();
        let self_update = config.self_update_on_start;
        let (manager, rx) = Self::with_extractor(config, Arc::new(cli))?;
        if self_update {
            spawn_self_update_check(&manager.runtime, binary);
        }
        Ok((manager, rx))
    }

    /// Manager backed by any extractor; performs no self-update check.
    ///
    /// Must be called from within a tokio runtime. Workers are spawned on
    /// that runtime, so `submit` may later be called from any thread.
    pub fn with_extractor(
        config: AppConfig,
        extractor: Arc<dyn MediaExtractor>,
    ) -> Result<(Self, EventReceiver), DownloadError> {
        let runtime = Handle::try_current()
            .map_err(|e| DownloadError::Execution(format!("Download manager needs a tokio runtime: {}", e)))?;
        std::fs::create_dir_all(&config.download_folder)?;
        info!(
            folder = %config.download_folder.display(),
            extractor = extractor.name(),
            "Download manager ready"
        );
        if !extractor.is_available() {
            warn!("{} is not available; downloads will fail until it is installed", extractor.name());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let permits = config
            .max_concurrent_downloads
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        let manager = Self {
            detector: ServiceDetector::default(),
            extractor,
            active: Arc::new(ActiveDownloads::new(tx)),
            stop: StopSignal::new(),
            permits,
            runtime,
            config,
        };
        Ok((manager, rx))
    }

    /// Accept a request and start it in the background
    pub fn submit(&self, request: DownloadRequest) -> DownloadId {
        let id = DownloadId::new();
        let detection = self.detector.detect(&request.url);
        info!(
            download_id = %id.short(),
            service = detection.name(),
            kind = request.kind.label(),
            "Queued {}",
            request.url
        );

        self.active.insert(DownloadRecord::new(id, &request, &detection));

        let ctx = WorkerContext {
            active: Arc::clone(&self.active),
            extractor: Arc::clone(&self.extractor),
            retry: self.config.retry.clone(),
            network: self.config.network.clone(),
            stop: self.stop.token(),
            permits: self.permits.clone(),
        };
        self.runtime.spawn(DownloadWorker::new(id, request, detection, ctx).run());
        id
    }

    /// Presentation-layer entry point taking the raw form values
    pub fn start_download(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        audio_only: bool,
        quality_label: &str,
    ) -> DownloadId {
        let request = if audio_only {
            DownloadRequest::audio(url, destination)
        } else {
            let quality = quality_label.parse::<QualityTier>().unwrap_or_default();
            DownloadRequest::video(url, quality, destination)
        };
        self.submit(request)
    }

    /// Title, uploader, duration and views of a page, without downloading
    pub async fn fetch_info(&self, url: &str) -> Result<MediaInfo, DownloadError> {
        let url = clean_url(url);
        if url.is_empty() {
            return Err(DownloadError::InvalidRequest("empty URL".to_string()));
        }
        self.extractor.info(&url).await
    }

    /// Set the stop flag and report every active download as stopped
    pub fn stop_all(&self) {
        self.stop.trigger();
        let stopped = self.active.stop_all();
        info!("Stopped {} active download(s)", stopped);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_set()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_ids(&self) -> Vec<DownloadId> {
        self.active.ids()
    }

    pub fn snapshot(&self, id: DownloadId) -> Option<DownloadRecord> {
        self.active.get(id)
    }

    pub fn download_folder(&self) -> &std::path::Path {
        &self.config.download_folder
    }
}
