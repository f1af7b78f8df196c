//! Configuration for the pipeline runner.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pipeline runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root under which each run gets its own directory.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Runs executing at once; further runs wait in `created`.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// How long a finished artifact waits for collection, in seconds.
    #[serde(default = "default_artifact_ttl")]
    pub artifact_ttl_secs: u64,

    /// Interval between expiry sweeps, in seconds.
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// Cancel a run when its progress subscriber disconnects early.
    #[serde(default = "default_true")]
    pub cancel_on_disconnect: bool,

    /// Time budget for downloading artwork, in seconds.
    #[serde(default = "default_artwork_timeout")]
    pub artwork_timeout_secs: u64,

    /// Live event buffer per run.
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("tubetag-runs")
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_artifact_ttl() -> u64 {
    900 // 15 minutes
}

fn default_reap_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_artwork_timeout() -> u64 {
    30
}

fn default_progress_capacity() -> usize {
    256
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_concurrent_runs: default_max_concurrent_runs(),
            artifact_ttl_secs: default_artifact_ttl(),
            reap_interval_secs: default_reap_interval(),
            cancel_on_disconnect: default_true(),
            artwork_timeout_secs: default_artwork_timeout(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.work_dir.ends_with("tubetag-runs"));
        assert_eq!(config.max_concurrent_runs, 4);
        assert_eq!(config.artifact_ttl_secs, 900);
        assert!(config.cancel_on_disconnect);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PipelineConfig = toml::from_str(
            r#"
            work_dir = "/srv/tubetag"
            cancel_on_disconnect = false
        "#,
        )
        .unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/srv/tubetag"));
        assert!(!config.cancel_on_disconnect);
        assert_eq!(config.reap_interval_secs, 60);
    }
}
