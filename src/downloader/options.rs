// Extractor options - everything handed to the extraction library per attempt

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::format_selector::{FormatPlan, FormatSelector, PostProcess};
use super::models::DownloadRequest;
use super::services::ServiceKind;
use crate::config::NetworkConfig;

/// Output file naming: "<media title>.<container extension>"
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Pick a User-Agent from the fixed pool
pub fn random_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

pub fn user_agent_pool() -> &'static [&'static str] {
    USER_AGENTS
}

/// Full configuration for one extraction attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorOptions {
    /// Full path template, destination folder included
    pub output_template: PathBuf,
    pub user_agent: String,
    /// Extra request headers (User-Agent excluded)
    pub headers: BTreeMap<String, String>,
    pub format: String,
    pub postprocess: PostProcess,
    /// e.g. "youtube:player_client=web;skip=hls"
    pub extractor_args: Vec<String>,
    pub network: NetworkConfig,
    pub no_playlist: bool,
    pub skip_certificate_check: bool,
    pub geo_bypass: bool,
    /// `None` means proxying is explicitly disabled
    pub proxy: Option<String>,
}

impl ExtractorOptions {
    /// Generic browser-like configuration, no service specifics
    pub fn base(destination: &Path, plan: FormatPlan, network: &NetworkConfig) -> Self {
        let headers = [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
            ("Accept-Language", "en-us,en;q=0.5"),
            ("Accept-Encoding", "gzip, deflate"),
            ("DNT", "1"),
            ("Connection", "keep-alive"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            output_template: destination.join(OUTPUT_TEMPLATE),
            user_agent: random_user_agent(),
            headers,
            format: plan.format,
            postprocess: plan.postprocess,
            extractor_args: Vec::new(),
            network: network.clone(),
            no_playlist: true,
            skip_certificate_check: true,
            geo_bypass: true,
            proxy: None,
        }
    }

    /// Build the complete option set for a request and its detected service
    pub fn for_request(
        request: &DownloadRequest,
        service: Option<ServiceKind>,
        network: &NetworkConfig,
    ) -> Self {
        let plan = FormatSelector::plan(request.kind, request.quality, service);
        let mut options = Self::base(&request.destination, plan, network);
        if let Some(service) = service {
            options.apply_service_profile(service);
        }
        options
    }

    /// Layer service-specific headers and extractor hints over the base set
    pub fn apply_service_profile(&mut self, service: ServiceKind) {
        match service {
            ServiceKind::YouTube => {
                self.set_header("Referer", "https://www.youtube.com/");
                self.set_header("Origin", "https://www.youtube.com");
                self.extractor_args
                    .push("youtube:player_client=web;skip=hls;formats=missing_pot".to_string());
            }
            ServiceKind::TikTok => {
                self.set_header("Referer", "https://www.tiktok.com/");
                self.set_header("Origin", "https://www.tiktok.com");
                self.set_header("Authority", "www.tiktok.com");
                self.set_header("Cache-Control", "max-age=0");
                self.set_header(
                    "Sec-Ch-Ua",
                    r#""Not A(Brand";v="99", "Google Chrome";v="121", "Chromium";v="121""#,
                );
                self.set_header("Sec-Ch-Ua-Mobile", "?0");
                self.set_header("Sec-Ch-Ua-Platform", r#""macOS""#);
                self.extractor_args
                    .push("tiktok:webpage_url_basename=video;api_hostname=api.tiktokv.com".to_string());
            }
            ServiceKind::Instagram => {
                self.set_header("Referer", "https://www.instagram.com/");
                self.set_header("Origin", "https://www.instagram.com");
                self.set_header("X-Instagram-AJAX", "1");
                self.set_header("X-Requested-With", "XMLHttpRequest");
            }
            _ => {}
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Fresh User-Agent before every attempt
    pub fn rotate_user_agent(&mut self) {
        self.user_agent = random_user_agent();
    }
}
