//! Configuration for the extractor module.

use serde::{Deserialize, Serialize};

/// Configuration for the yt-dlp based extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Time budget for a metadata-only lookup, in seconds.
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    /// Time budget for a full audio extraction, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Audio format requested from the extractor.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Additional arguments passed before the source reference.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_metadata_timeout() -> u64 {
    60
}

fn default_download_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: default_metadata_timeout(),
            download_timeout_secs: default_download_timeout(),
            audio_format: default_audio_format(),
            extra_args: Vec::new(),
        }
    }
}
