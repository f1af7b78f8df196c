//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of every component trait the
//! pipeline calls into, allowing full runs without yt-dlp, ffmpeg or the
//! catalog API.
//!
//! # Example
//!
//! ```rust,ignore
//! use tubetag_core::testing::MockPipeline;
//!
//! let mocks = MockPipeline::new();
//! mocks.catalog.set_no_match().await;
//!
//! let runner = mocks.runner(config);
//! let handle = runner.start(source).await;
//! ```

mod mock_artwork;
mod mock_catalog;
mod mock_extractor;
mod mock_muxer;
mod mock_tools;

pub use mock_artwork::MockArtworkFetcher;
pub use mock_catalog::MockCatalog;
pub use mock_extractor::{MockExtractor, RecordedExtraction};
pub use mock_muxer::MockMuxer;
pub use mock_tools::MockToolInstaller;

use std::sync::Arc;

use crate::pipeline::{PipelineConfig, PipelineDeps, PipelineRunner};
use crate::provisioner::CredentialStore;

/// One mock of each pipeline component, sharing state with the runner
/// built from them.
#[derive(Clone, Default)]
pub struct MockPipeline {
    pub extractor: MockExtractor,
    pub catalog: MockCatalog,
    pub artwork: MockArtworkFetcher,
    pub muxer: MockMuxer,
    pub credentials: Arc<CredentialStore>,
}

impl MockPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deps(&self) -> PipelineDeps {
        PipelineDeps {
            extractor: Arc::new(self.extractor.clone()),
            catalog: Arc::new(self.catalog.clone()),
            artwork: Arc::new(self.artwork.clone()),
            muxer: Arc::new(self.muxer.clone()),
            credentials: self.credentials.clone(),
        }
    }

    /// Build a runner over these mocks.
    pub fn runner(&self, config: PipelineConfig) -> Arc<PipelineRunner> {
        Arc::new(PipelineRunner::new(config, self.deps()))
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use std::path::Path;

    use crate::catalog::TrackMetadata;
    use crate::extractor::{SourceReference, VideoMetadata};
    use crate::pipeline::PipelineConfig;
    use crate::provisioner::SessionCookies;

    /// Create a catalog track with reasonable defaults.
    pub fn track_metadata(title: &str, artists: &[&str]) -> TrackMetadata {
        TrackMetadata {
            catalog_id: format!("sp-{}", title.to_lowercase().replace(' ', "-")),
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: "Album".to_string(),
            artwork_url: "https://i.scdn.co/image/cover-640".to_string(),
            popularity: Some(60),
            duration_ms: Some(215_000),
        }
    }

    /// Create video metadata as yt-dlp would report it.
    pub fn video_metadata(title: &str, uploader: Option<&str>) -> VideoMetadata {
        VideoMetadata {
            title: title.to_string(),
            uploader: uploader.map(str::to_string),
            duration_secs: Some(215.0),
            webpage_url: None,
        }
    }

    /// A valid source reference.
    pub fn source(url: &str) -> SourceReference {
        SourceReference::new(url).expect("fixture source must be non-empty")
    }

    /// Cookies in Netscape format.
    pub fn session_cookies() -> SessionCookies {
        SessionCookies {
            contents: "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc\n"
                .into(),
            fetched_at: Utc::now(),
        }
    }

    /// Pipeline config rooted at `work_dir` with short timeouts.
    pub fn pipeline_config(work_dir: &Path) -> PipelineConfig {
        PipelineConfig {
            work_dir: work_dir.to_path_buf(),
            max_concurrent_runs: 16,
            artifact_ttl_secs: 600,
            reap_interval_secs: 60,
            cancel_on_disconnect: true,
            artwork_timeout_secs: 5,
            progress_capacity: 256,
        }
    }
}
