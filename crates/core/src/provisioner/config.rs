//! Configuration for tool and credential provisioning.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the external binaries live and where to fetch them from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory that receives downloaded binaries.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// yt-dlp binary. A bare name is looked up on `PATH`.
    #[serde(default = "default_extractor_path")]
    pub extractor_path: PathBuf,

    /// Download URL for yt-dlp when it is not already present.
    #[serde(default = "default_extractor_url")]
    pub extractor_url: Option<String>,

    /// ffmpeg binary. A bare name is looked up on `PATH`.
    #[serde(default = "default_muxer_path")]
    pub muxer_path: PathBuf,

    /// Download URL for ffmpeg (a static build, `.tar.xz` archives are unpacked).
    #[serde(default = "default_muxer_url")]
    pub muxer_url: Option<String>,

    /// Whether missing tools may be downloaded at all.
    #[serde(default = "default_true")]
    pub auto_install: bool,

    /// Time budget for a single download-and-install, in seconds.
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
}

fn default_install_dir() -> PathBuf {
    std::env::temp_dir().join("tubetag-tools")
}

fn default_extractor_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_extractor_url() -> Option<String> {
    Some("https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp".to_string())
}

fn default_muxer_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_muxer_url() -> Option<String> {
    Some(
        "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz"
            .to_string(),
    )
}

fn default_true() -> bool {
    true
}

fn default_install_timeout() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            extractor_path: default_extractor_path(),
            extractor_url: default_extractor_url(),
            muxer_path: default_muxer_path(),
            muxer_url: default_muxer_url(),
            auto_install: true,
            install_timeout_secs: default_install_timeout(),
        }
    }
}

/// Session-cookie material used by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// URL serving a Netscape-format cookies file. Refresh is disabled when unset.
    #[serde(default)]
    pub cookies_url: Option<String>,

    /// Token sent as `Authorization: token <value>` when fetching cookies.
    #[serde(default)]
    pub cookies_token: Option<String>,

    /// How often cookies are re-fetched, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Where the latest cookies are mirrored on disk.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_refresh_interval() -> u64 {
    12 * 60 * 60
}

fn default_state_dir() -> PathBuf {
    std::env::temp_dir().join("tubetag-state")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cookies_url: None,
            cookies_token: None,
            refresh_interval_secs: default_refresh_interval(),
            state_dir: default_state_dir(),
        }
    }
}
