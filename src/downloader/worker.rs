// Download worker - drives one accepted request to a terminal state
//
// Queued -> Downloading -> Completed | Failed | Stopped
//
// The stop signal is checked at start, after the politeness delay, before
// every attempt and while sleeping between attempts. A running extractor
// call is not interrupted.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};

use super::errors::DownloadError;
use super::extractor::{MediaExtractor, ProgressTick, TickStatus};
use super::format_selector::{AUDIO_EXTENSION, VIDEO_EXTENSION};
use super::models::{DownloadId, DownloadRequest, DownloadStatus};
use super::options::ExtractorOptions;
use super::registry::{ActiveDownloads, STOPPED_MESSAGE};
use super::services::Detection;
use super::utils::{clean_url, display_filename, fallback_filename, format_eta, with_extension};
use crate::config::{NetworkConfig, RetryPolicy};

pub const COMPLETED_MESSAGE: &str = "Download completed";

/// Global stop flag, owned by the manager
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker-side view of the stop flag
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is set; never resolves if the signal is dropped unset
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `delay`; returns true if stopped first
    pub async fn sleep_or_stop(&self, delay: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        if delay.is_zero() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.is_stopped(),
            _ = self.stopped() => true,
        }
    }
}

lazy_static! {
    static ref PERCENT_RE: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap();
}

/// Percentage for one tick: exact total, then estimate, then the percent string
pub fn compute_progress(tick: &ProgressTick) -> Option<f64> {
    let ratio = match (tick.downloaded_bytes, tick.total_bytes, tick.total_bytes_estimate) {
        (Some(done), Some(total), _) if total > 0.0 => Some(done / total * 100.0),
        (Some(done), _, Some(estimate)) if estimate > 0.0 => Some(done / estimate * 100.0),
        _ => tick
            .percent_str
            .as_deref()
            .and_then(|s| PERCENT_RE.captures(s))
            .and_then(|caps| caps[1].parse::<f64>().ok()),
    }?;

    ratio.is_finite().then(|| ratio.clamp(0.0, 100.0))
}

/// What every worker shares with the manager
#[derive(Clone)]
pub struct WorkerContext {
    pub active: Arc<ActiveDownloads>,
    pub extractor: Arc<dyn MediaExtractor>,
    pub retry: RetryPolicy,
    pub network: NetworkConfig,
    pub stop: StopToken,
    pub permits: Option<Arc<Semaphore>>,
}

enum Outcome {
    Completed,
    Stopped,
    Failed(DownloadError),
}

pub struct DownloadWorker {
    id: DownloadId,
    request: DownloadRequest,
    detection: Detection,
    ctx: WorkerContext,
}

impl DownloadWorker {
    pub fn new(id: DownloadId, request: DownloadRequest, detection: Detection, ctx: WorkerContext) -> Self {
        Self {
            id,
            request,
            detection,
            ctx,
        }
    }

    /// Run to a terminal state and report it exactly once
    pub async fn run(self) {
        let outcome = self.execute().await;
        let is_audio = self.request.kind.is_audio();

        match outcome {
            Outcome::Completed => {
                info!(download_id = %self.id.short(), service = self.detection.name(), "Download completed");
                self.ctx.active.finish(
                    self.id,
                    |record| {
                        record.status = DownloadStatus::Completed;
                        record.progress = 100.0;
                        record.eta = None;
                        if record.filename.is_empty() {
                            let extension = if is_audio { AUDIO_EXTENSION } else { VIDEO_EXTENSION };
                            record.filename = fallback_filename(&record.url, extension);
                        } else if is_audio {
                            record.filename = with_extension(&record.filename, AUDIO_EXTENSION);
                        }
                    },
                    true,
                    COMPLETED_MESSAGE.to_string(),
                );
            }
            Outcome::Stopped => {
                info!(download_id = %self.id.short(), "Download stopped");
                self.ctx.active.finish(
                    self.id,
                    |record| record.status = DownloadStatus::Stopped,
                    false,
                    STOPPED_MESSAGE.to_string(),
                );
            }
            Outcome::Failed(err) => {
                let category = err.category(self.detection.name());
                let message = category.user_message();
                error!(
                    download_id = %self.id.short(),
                    service = self.detection.name(),
                    error = %err.raw_message(),
                    "Download failed: {}",
                    message
                );
                let reported = message.clone();
                self.ctx.active.finish(
                    self.id,
                    move |record| {
                        record.status = DownloadStatus::Failed;
                        record.progress = 0.0;
                        record.error = Some(reported);
                    },
                    false,
                    message,
                );
            }
        }
    }

    async fn execute(&self) -> Outcome {
        let stop = &self.ctx.stop;
        if stop.is_stopped() {
            return Outcome::Stopped;
        }

        // Held until this function returns
        let _permit = match &self.ctx.permits {
            Some(permits) => {
                tokio::select! {
                    permit = permits.clone().acquire_owned() => permit.ok(),
                    _ = stop.stopped() => return Outcome::Stopped,
                }
            }
            None => None,
        };

        if let Err(e) = self.request.check_destination() {
            return Outcome::Failed(e);
        }

        let url = clean_url(&self.request.url);
        if stop.sleep_or_stop(self.ctx.retry.preflight_delay.sample()).await {
            return Outcome::Stopped;
        }

        if !self.ctx.active.update(self.id, |record| record.status = DownloadStatus::Downloading) {
            // Evicted by stop_all while we were waiting
            return Outcome::Stopped;
        }

        let mut options = ExtractorOptions::for_request(&self.request, self.detection.kind(), &self.ctx.network);
        let attempts = self.ctx.retry.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if stop.is_stopped() {
                return Outcome::Stopped;
            }
            options.rotate_user_agent();
            info!(
                download_id = %self.id.short(),
                service = self.detection.name(),
                attempt,
                "Starting attempt {}/{} with {}",
                attempt,
                attempts,
                self.ctx.extractor.name()
            );

            let err = match self.attempt(&url, &options).await {
                Ok(()) => return Outcome::Completed,
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(download_id = %self.id.short(), attempt, "Non-retryable error: {}", err.raw_message());
                return Outcome::Failed(err);
            }

            warn!(download_id = %self.id.short(), attempt, "Attempt failed: {}", err.raw_message());
            last_error = Some(err);

            if attempt < attempts {
                let delay = self.ctx.retry.backoff_for(attempt);
                debug!(download_id = %self.id.short(), "Retrying in {:?}", delay);
                if stop.sleep_or_stop(delay).await {
                    return Outcome::Stopped;
                }
            }
        }

        Outcome::Failed(last_error.unwrap_or_else(|| DownloadError::Extraction("Download failed".to_string())))
    }

    /// One extractor call, forwarding its ticks as they arrive
    async fn attempt(&self, url: &str, options: &ExtractorOptions) -> Result<(), DownloadError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let download = self.ctx.extractor.download(url, options, tx);
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                biased;
                Some(tick) = rx.recv() => self.apply_tick(&tick),
                result = &mut download => break result,
            }
        };

        // Ticks sent right before the call returned
        while let Ok(tick) = rx.try_recv() {
            self.apply_tick(&tick);
        }
        result
    }

    fn apply_tick(&self, tick: &ProgressTick) {
        let is_audio = self.request.kind.is_audio();
        self.ctx.active.update(self.id, |record| {
            if let Some(name) = tick.filename.as_deref().filter(|n| !n.is_empty()) {
                record.filename = display_filename(name);
            }
            match tick.status {
                TickStatus::Downloading => {
                    if let Some(progress) = compute_progress(tick) {
                        record.progress = record.progress.max(progress);
                    }
                    if let Some(speed) = tick.speed.filter(|s| s.is_finite()) {
                        record.speed_kbps = speed / 1024.0;
                    }
                    if let Some(eta) = tick.eta.and_then(format_eta) {
                        record.eta = Some(eta);
                    }
                }
                TickStatus::Finished => {
                    record.progress = 100.0;
                    if is_audio {
                        record.filename = with_extension(&record.filename, AUDIO_EXTENSION);
                    }
                }
                _ => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick() -> ProgressTick {
        ProgressTick::default()
    }

    #[test]
    fn test_progress_prefers_exact_total() {
        let t = ProgressTick {
            downloaded_bytes: Some(50.0),
            total_bytes: Some(200.0),
            total_bytes_estimate: Some(100.0),
            percent_str: Some("90%".to_string()),
            ..tick()
        };
        assert_eq!(compute_progress(&t), Some(25.0));
    }

    #[test]
    fn test_progress_falls_back_to_estimate_then_string() {
        let estimated = ProgressTick {
            downloaded_bytes: Some(50.0),
            total_bytes_estimate: Some(100.0),
            ..tick()
        };
        assert_eq!(compute_progress(&estimated), Some(50.0));

        let colored = ProgressTick {
            percent_str: Some("\u{1b}[0;94m 42.5%\u{1b}[0m".to_string()),
            ..tick()
        };
        assert_eq!(compute_progress(&colored), Some(42.5));
        assert_eq!(compute_progress(&tick()), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        let over = ProgressTick::downloading(300.0, Some(100.0));
        assert_eq!(compute_progress(&over), Some(100.0));
        let zero_total = ProgressTick::downloading(10.0, Some(0.0));
        assert_eq!(compute_progress(&zero_total), None);
    }

    #[tokio::test]
    async fn test_stop_token() {
        let signal = StopSignal::new();
        let token = signal.token();
        assert!(!token.is_stopped());
        assert!(!token.sleep_or_stop(Duration::from_millis(1)).await);

        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.sleep_or_stop(Duration::from_secs(30)).await });
        signal.trigger();
        assert!(handle.await.unwrap());
        assert!(token.is_stopped());
        assert!(signal.is_set());
    }
}
