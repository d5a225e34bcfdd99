// FormatSelector - picks the yt-dlp format expression and post-processing step
//
// Audio requests prefer a compact audio-only stream and are always converted
// to MP3. Video requests map the quality tier onto a height filter with
// fallbacks (mp4 at that height, any container at that height, best mp4,
// best) and are always converted to MP4.

use serde::{Deserialize, Serialize};

use super::models::{MediaKind, QualityTier};
use super::services::ServiceKind;

pub const AUDIO_EXTENSION: &str = "mp3";
pub const VIDEO_EXTENSION: &str = "mp4";

/// Container normalisation applied after download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostProcess {
    /// Extract audio and encode it with the given codec and bitrate (kbps)
    ExtractAudio { codec: String, bitrate_kbps: u32 },
    /// Convert the video into the given container
    ConvertVideo { container: String },
}

impl PostProcess {
    /// Extension of the file the post-processor produces
    pub fn target_extension(&self) -> &str {
        match self {
            Self::ExtractAudio { codec, .. } => codec,
            Self::ConvertVideo { container } => container,
        }
    }
}

/// Format expression plus post-processing for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPlan {
    pub format: String,
    pub postprocess: PostProcess,
}

pub struct FormatSelector;

impl FormatSelector {
    pub fn plan(kind: MediaKind, quality: QualityTier, service: Option<ServiceKind>) -> FormatPlan {
        match kind {
            MediaKind::Audio => Self::audio_plan(service),
            MediaKind::Video => FormatPlan {
                format: Self::video_format(quality, service),
                postprocess: PostProcess::ConvertVideo {
                    container: VIDEO_EXTENSION.to_string(),
                },
            },
        }
    }

    fn audio_plan(service: Option<ServiceKind>) -> FormatPlan {
        // SoundCloud serves audio natively; keep it at a high bitrate.
        let (format, bitrate_kbps) = match service {
            Some(ServiceKind::SoundCloud) => ("bestaudio/best", 320),
            _ => ("bestaudio[ext=m4a]/bestaudio/best", 192),
        };

        FormatPlan {
            format: format.to_string(),
            postprocess: PostProcess::ExtractAudio {
                codec: AUDIO_EXTENSION.to_string(),
                bitrate_kbps,
            },
        }
    }

    /// Get format spec for yt-dlp based on quality tier
    pub fn video_format(quality: QualityTier, service: Option<ServiceKind>) -> String {
        // TikTok only offers a single rendition worth picking
        if service == Some(ServiceKind::TikTok) {
            return "best[ext=mp4]/best".to_string();
        }

        match quality.max_height() {
            Some(height) => format!(
                "best[height<={h}][ext=mp4]/best[height<={h}]/best[ext=mp4]/best",
                h = height
            ),
            None => "best[ext=mp4]/best".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundcloud_audio_uses_high_bitrate() {
        let plan = FormatSelector::plan(MediaKind::Audio, QualityTier::Auto, Some(ServiceKind::SoundCloud));
        assert_eq!(plan.format, "bestaudio/best");
        assert_eq!(
            plan.postprocess,
            PostProcess::ExtractAudio {
                codec: "mp3".to_string(),
                bitrate_kbps: 320
            }
        );
    }

    #[test]
    fn test_generic_audio_prefers_m4a() {
        let plan = FormatSelector::plan(MediaKind::Audio, QualityTier::FullHd, Some(ServiceKind::YouTube));
        assert_eq!(plan.format, "bestaudio[ext=m4a]/bestaudio/best");
        assert_eq!(plan.postprocess.target_extension(), "mp3");
    }

    #[test]
    fn test_video_height_fallbacks() {
        let plan = FormatSelector::plan(MediaKind::Video, QualityTier::Hd, Some(ServiceKind::YouTube));
        assert_eq!(
            plan.format,
            "best[height<=720][ext=mp4]/best[height<=720]/best[ext=mp4]/best"
        );
        assert_eq!(plan.postprocess.target_extension(), "mp4");
    }

    #[test]
    fn test_video_auto_has_no_bound() {
        assert_eq!(
            FormatSelector::video_format(QualityTier::Auto, None),
            "best[ext=mp4]/best"
        );
    }

    #[test]
    fn test_tiktok_ignores_quality() {
        assert_eq!(
            FormatSelector::video_format(QualityTier::UltraHd, Some(ServiceKind::TikTok)),
            "best[ext=mp4]/best"
        );
    }
}
