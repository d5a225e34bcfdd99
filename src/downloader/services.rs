// Service detection - classifies a URL into a known media platform
//
// Lookup order, first hit wins:
// 1. primary table (fixed priority order, full metadata)
// 2. extended pattern table (synthesized default metadata)
// 3. service keyword appearing in the host
//
// Patterns are compiled once when the detector is built. A pattern that does
// not compile is logged and skipped; the rest of its table stays usable.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

use super::models::DEFAULT_SERVICE_ICON;

pub const UNSUPPORTED_SERVICE: &str = "Unsupported service";

/// Known media platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    YouTube,
    TikTok,
    Instagram,
    SoundCloud,
    Twitter,
    Facebook,
    Twitch,
    Vimeo,
    Vk,
    Rutube,
}

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::TikTok => "TikTok",
            Self::Instagram => "Instagram",
            Self::SoundCloud => "SoundCloud",
            Self::Twitter => "Twitter/X",
            Self::Facebook => "Facebook",
            Self::Twitch => "Twitch",
            Self::Vimeo => "Vimeo",
            Self::Vk => "VK",
            Self::Rutube => "Rutube",
        }
    }

    /// Icon used by the primary table
    pub fn icon(&self) -> &'static str {
        match self {
            Self::YouTube => "🎥",
            Self::TikTok => "🎵",
            Self::Instagram => "📸",
            Self::SoundCloud => "🎶",
            Self::Twitter => "🐦",
            Self::Facebook => "👥",
            Self::Twitch => "🎮",
            Self::Vimeo => "📹",
            Self::Vk => "🔵",
            Self::Rutube => "🎬",
        }
    }

    /// Icon synthesized for extended-table and host matches
    pub fn default_icon(&self) -> &'static str {
        match self {
            Self::YouTube => "📺",
            Self::Twitch => "🎮",
            Self::TikTok => "🎵",
            Self::Instagram => "📷",
            Self::Vk => "🔵",
            Self::Rutube => "🎬",
            _ => DEFAULT_SERVICE_ICON,
        }
    }

    pub fn formats(&self) -> Vec<OutputFormat> {
        match self {
            Self::SoundCloud => vec![OutputFormat::Mp3],
            _ => vec![OutputFormat::Mp4, OutputFormat::Mp3],
        }
    }

    /// Lower-case keyword searched for in the host as a last resort
    fn host_keyword(&self) -> String {
        self.name().to_lowercase()
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output format families a service supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Mp4,
    Mp3,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mp3 => "mp3",
        }
    }
}

/// Static service metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,
    pub name: String,
    pub icon: String,
    pub patterns: Vec<String>,
    pub formats: Vec<OutputFormat>,
}

impl ServiceDescriptor {
    fn primary(kind: ServiceKind, patterns: &[String]) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            icon: kind.icon().to_string(),
            patterns: patterns.to_vec(),
            formats: kind.formats(),
        }
    }

    fn synthesized(kind: ServiceKind, patterns: &[String]) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            icon: kind.default_icon().to_string(),
            patterns: patterns.to_vec(),
            formats: vec![OutputFormat::Mp4, OutputFormat::Mp3],
        }
    }
}

/// Which stage of the lookup produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSource {
    Primary,
    Extended,
    Host,
}

/// Result of [`ServiceDetector::detect`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub descriptor: Option<ServiceDescriptor>,
    pub source: Option<MatchSource>,
}

impl Detection {
    pub fn unsupported() -> Self {
        Self {
            descriptor: None,
            source: None,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor
            .as_ref()
            .map_or(UNSUPPORTED_SERVICE, |d| d.name.as_str())
    }

    pub fn icon(&self) -> &str {
        self.descriptor
            .as_ref()
            .map_or(DEFAULT_SERVICE_ICON, |d| d.icon.as_str())
    }

    pub fn kind(&self) -> Option<ServiceKind> {
        self.descriptor.as_ref().map(|d| d.kind)
    }

    pub fn is_supported(&self) -> bool {
        self.descriptor.is_some()
    }
}

struct TableEntry {
    kind: ServiceKind,
    raw: Vec<String>,
    compiled: Vec<Regex>,
}

impl TableEntry {
    fn compile(kind: ServiceKind, patterns: Vec<String>) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(service = kind.name(), pattern = %p, error = %e, "Skipping malformed service pattern");
                    None
                }
            })
            .collect();

        Self {
            kind,
            raw: patterns,
            compiled,
        }
    }

    fn matches(&self, url: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(url))
    }
}

/// Ordered pattern tables, built once at startup
pub struct ServiceDetector {
    primary: Vec<TableEntry>,
    extended: Vec<TableEntry>,
}

impl ServiceDetector {
    pub fn new(
        primary: Vec<(ServiceKind, Vec<String>)>,
        extended: Vec<(ServiceKind, Vec<String>)>,
    ) -> Self {
        Self {
            primary: primary
                .into_iter()
                .map(|(kind, patterns)| TableEntry::compile(kind, patterns))
                .collect(),
            extended: extended
                .into_iter()
                .map(|(kind, patterns)| TableEntry::compile(kind, patterns))
                .collect(),
        }
    }

    pub fn detect(&self, url: &str) -> Detection {
        let lower = url.trim().to_lowercase();
        if lower.is_empty() {
            debug!("Empty URL passed to service detection");
            return Detection::unsupported();
        }

        for entry in &self.primary {
            if entry.matches(&lower) {
                info!(service = entry.kind.name(), "Service detected");
                return Detection {
                    descriptor: Some(ServiceDescriptor::primary(entry.kind, &entry.raw)),
                    source: Some(MatchSource::Primary),
                };
            }
        }

        for entry in &self.extended {
            if entry.matches(&lower) {
                info!(service = entry.kind.name(), "Service detected via extended patterns");
                return Detection {
                    descriptor: Some(ServiceDescriptor::synthesized(entry.kind, &entry.raw)),
                    source: Some(MatchSource::Extended),
                };
            }
        }

        if let Some(host) = Url::parse(&lower).ok().and_then(|u| u.host_str().map(str::to_string)) {
            for entry in &self.extended {
                if host.contains(&entry.kind.host_keyword()) {
                    info!(service = entry.kind.name(), host = %host, "Service detected by host");
                    return Detection {
                        descriptor: Some(ServiceDescriptor::synthesized(entry.kind, &entry.raw)),
                        source: Some(MatchSource::Host),
                    };
                }
            }
        }

        debug!(url = %url, "Service not supported");
        Detection::unsupported()
    }
}

impl Default for ServiceDetector {
    fn default() -> Self {
        Self::new(to_owned_table(PRIMARY_SERVICES), to_owned_table(EXTENDED_PATTERNS))
    }
}

type StaticTable = &'static [(ServiceKind, &'static [&'static str])];

const PRIMARY_SERVICES: StaticTable = &[
    (ServiceKind::YouTube, &[r"youtube\.com", r"youtu\.be"]),
    (ServiceKind::TikTok, &[r"tiktok\.com"]),
    (ServiceKind::Instagram, &[r"instagram\.com"]),
    (ServiceKind::SoundCloud, &[r"soundcloud\.com"]),
    // anchored so that e.g. netflix.com does not count as x.com
    (ServiceKind::Twitter, &[r"twitter\.com", r"(?:^|[/.])x\.com"]),
    (ServiceKind::Facebook, &[r"facebook\.com", r"fb\.watch"]),
    (ServiceKind::Twitch, &[r"twitch\.tv"]),
    (ServiceKind::Vimeo, &[r"vimeo\.com"]),
];

const EXTENDED_PATTERNS: StaticTable = &[
    (
        ServiceKind::YouTube,
        &[
            r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)",
            r"youtube\.com/playlist\?list=",
            r"youtube\.com/shorts/",
            r"m\.youtube\.com",
        ],
    ),
    (
        ServiceKind::Twitch,
        &[
            r"twitch\.tv/videos/",
            r"twitch\.tv/\w+/clip/",
            r"clips\.twitch\.tv/",
            r"m\.twitch\.tv",
        ],
    ),
    (
        ServiceKind::TikTok,
        &[
            r"tiktok\.com/@[\w.-]+/video/",
            r"vm\.tiktok\.com/",
            r"m\.tiktok\.com",
            r"tiktok\.com/t/",
        ],
    ),
    (
        ServiceKind::Instagram,
        &[
            r"instagram\.com/p/",
            r"instagram\.com/reel/",
            r"instagram\.com/tv/",
            r"instagr\.am",
        ],
    ),
    (ServiceKind::Vk, &[r"vk\.com/video", r"vk\.com/clip", r"m\.vk\.com"]),
    (ServiceKind::Rutube, &[r"rutube\.ru/video/", r"m\.rutube\.ru"]),
];

fn to_owned_table(table: StaticTable) -> Vec<(ServiceKind, Vec<String>)> {
    table
        .iter()
        .map(|(kind, patterns)| (*kind, patterns.iter().map(|p| p.to_string()).collect()))
        .collect()
}

lazy_static::lazy_static! {
    static ref DEFAULT_DETECTOR: ServiceDetector = ServiceDetector::default();
}

/// Detect with the built-in tables
pub fn detect(url: &str) -> Detection {
    DEFAULT_DETECTOR.detect(url)
}

/// Icon for a URL, the globe when the service is unknown
pub fn service_icon(url: &str) -> String {
    detect(url).icon().to_string()
}

/// Video id for YouTube watch, embed, shorts and short links
pub fn extract_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path();

    if host.ends_with("youtube.com") {
        if path.contains("watch") {
            return parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned());
        }
        if path.contains("embed") || path.contains("shorts") {
            return path
                .rsplit('/')
                .find(|s| !s.is_empty())
                .map(str::to_string);
        }
    } else if host == "youtu.be" {
        let id = path.trim_matches('/');
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    None
}

/// True for YouTube playlist links
pub fn is_playlist(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com") && lower.contains("list=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_detection() {
        let detection = detect("https://www.youtube.com/watch?v=abc123");
        assert_eq!(detection.name(), "YouTube");
        assert_eq!(detection.kind(), Some(ServiceKind::YouTube));
        assert_eq!(detection.source, Some(MatchSource::Primary));
        assert!(detection.descriptor.is_some());
    }

    #[test]
    fn test_tiktok_short_link() {
        let detection = detect("https://vm.tiktok.com/ZM123456/");
        assert_eq!(detection.name(), "TikTok");
        assert!(detection.descriptor.is_some());
    }

    #[test]
    fn test_extended_only_services() {
        let vk = detect("https://vk.com/video-123_456");
        assert_eq!(vk.name(), "VK");
        assert_eq!(vk.source, Some(MatchSource::Extended));
        assert_eq!(vk.icon(), "🔵");

        let rutube = detect("https://rutube.ru/video/abcdef/");
        assert_eq!(rutube.name(), "Rutube");
    }

    #[test]
    fn test_host_fallback() {
        let detection = detect("https://player.rutube.example/embed/1");
        assert_eq!(detection.name(), "Rutube");
        assert_eq!(detection.source, Some(MatchSource::Host));
    }

    #[test]
    fn test_unsupported() {
        let detection = detect("https://example.org/video");
        assert_eq!(detection.name(), UNSUPPORTED_SERVICE);
        assert!(detection.descriptor.is_none());
        assert_eq!(detection.icon(), DEFAULT_SERVICE_ICON);
    }

    #[test]
    fn test_x_pattern_is_anchored() {
        assert_eq!(detect("https://x.com/user/status/1").name(), "Twitter/X");
        assert_eq!(detect("https://www.netflix.com/title/1").name(), UNSUPPORTED_SERVICE);
    }

    #[test]
    fn test_priority_order() {
        // SoundCloud is listed before Twitter/X in the primary table
        let detection = detect("https://soundcloud.com/x.com/track");
        assert_eq!(detection.name(), "SoundCloud");
        assert_eq!(detection.descriptor.unwrap().formats, vec![OutputFormat::Mp3]);
    }

    #[test]
    fn test_malformed_pattern_is_skipped() {
        let detector = ServiceDetector::new(
            vec![(
                ServiceKind::Vimeo,
                vec!["(unclosed".to_string(), r"vimeo\.com".to_string()],
            )],
            vec![],
        );
        assert_eq!(detector.detect("https://vimeo.com/123").name(), "Vimeo");
        assert!(!detector.detect("https://example.org/x").is_supported());
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/abc"),
            Some("abc".to_string())
        );
        assert_eq!(extract_video_id("https://vimeo.com/123"), None);
    }

    #[test]
    fn test_playlist_and_icon() {
        assert!(is_playlist("https://www.youtube.com/watch?v=a&list=PL1"));
        assert!(!is_playlist("https://www.youtube.com/watch?v=a"));
        assert_eq!(service_icon("https://example.org/video"), "🌐");
        assert_eq!(service_icon("https://soundcloud.com/a/b"), "🎶");
    }
}
