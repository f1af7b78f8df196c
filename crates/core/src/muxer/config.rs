//! Configuration for the muxer module.

use serde::{Deserialize, Serialize};

/// Configuration for the ffmpeg tag/cover muxer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxerConfig {
    /// Time budget for one mux, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Additional ffmpeg arguments placed before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            log_level: default_log_level(),
            extra_args: Vec::new(),
        }
    }
}
