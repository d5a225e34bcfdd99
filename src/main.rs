use anyhow::{bail, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use media_downloader_lib::downloader::tools::ToolManager;
use media_downloader_lib::downloader::{
    check_url_accessibility, detect, validate, DownloadEvent, DownloadManager, DownloadStatus,
};
use media_downloader_lib::{init_logging, AppConfig};

#[derive(Parser)]
#[clap(name = "media-downloader")]
#[clap(about = "Download video or audio from media sharing sites")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Media page URLs
    #[clap(required_unless_present = "check_tools")]
    urls: Vec<String>,

    /// Extract audio as MP3
    #[clap(long)]
    audio: bool,

    /// Video quality (4k, 1080p, 720p, 480p, 360p, best)
    #[clap(long, default_value = "best")]
    quality: String,

    /// Destination folder (defaults to the configured download folder)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Show yt-dlp/ffmpeg availability and exit
    #[clap(long)]
    check_tools: bool,

    /// Print title, uploader, duration and views instead of downloading
    #[clap(long)]
    info: bool,
}

const ACCESS_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

async fn print_info(manager: &DownloadManager, url: &str) {
    let detection = detect(url);
    let formats = detection
        .descriptor
        .as_ref()
        .map(|d| d.formats.iter().map(|f| f.extension()).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    println!("{} {} [{}]", detection.icon(), detection.name(), formats);

    if !check_url_accessibility(url, ACCESS_CHECK_TIMEOUT).await {
        warn!("{} did not answer a HEAD request", url);
    }

    match manager.fetch_info(url).await {
        Ok(info) => {
            println!("  Title:    {}", info.title.as_deref().unwrap_or("Unknown"));
            println!("  Uploader: {}", info.uploader.as_deref().unwrap_or("Unknown"));
            println!("  Duration: {}", info.duration_label().unwrap_or_else(|| "Unknown".to_string()));
            println!("  Views:    {}", info.views_label().unwrap_or_else(|| "Unknown".to_string()));
        }
        Err(e) => error!("Could not read info for {}: {}", url, e.raw_message()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(output) = &cli.output {
        config.download_folder = output.clone();
    }
    let _guard = init_logging(config.log_dir.as_deref())?;

    if cli.check_tools {
        for tool in ToolManager::new(config.ytdlp_path.as_deref()).get_all_tools() {
            match (&tool.path, &tool.version) {
                (Some(path), version) => println!(
                    "{:<8} {} ({})",
                    tool.name,
                    version.as_deref().unwrap_or("unknown version"),
                    path
                ),
                (None, _) => println!("{:<8} not installed", tool.name),
            }
        }
        return Ok(());
    }

    let destination = config.download_folder.clone();
    let (manager, mut events) = DownloadManager::new(config)?;

    if cli.info {
        for url in cli.urls.iter().filter(|u| validate(u)) {
            print_info(&manager, url).await;
        }
        return Ok(());
    }

    let mut pending = HashSet::new();
    for url in &cli.urls {
        if !validate(url) {
            warn!("Invalid URL, skipping: {}", url);
            continue;
        }
        pending.insert(manager.start_download(url, &destination, cli.audio, &cli.quality));
    }
    if pending.is_empty() {
        bail!("No valid URLs to download");
    }

    let mut failures = 0usize;
    let mut interrupted = false;
    while !pending.is_empty() {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let id = event.id();
                match event {
                    DownloadEvent::Progress(record) if record.status == DownloadStatus::Downloading => {
                        info!(
                            "{} {} {:5.1}% {:8.1} KB/s ETA {} {}",
                            record.service_icon,
                            id.short(),
                            record.progress,
                            record.speed_kbps,
                            record.eta.as_deref().unwrap_or("--:--"),
                            record.filename
                        );
                    }
                    DownloadEvent::Progress(record) => {
                        info!("{} {} {} {}", record.service_icon, id.short(), record.status, record.filename);
                    }
                    DownloadEvent::Finished { success, message, .. } => {
                        pending.remove(&id);
                        if success {
                            info!("{} {}", id.short(), message);
                        } else {
                            failures += 1;
                            error!("{} {}", id.short(), message);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                warn!("Interrupted, stopping downloads");
                manager.stop_all();
            }
        }
    }

    if failures > 0 {
        bail!("{} download(s) did not complete", failures);
    }
    Ok(())
}
