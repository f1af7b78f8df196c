//! Trait definitions for the muxer module.

use async_trait::async_trait;

use super::error::MuxerError;
use super::types::{MuxJob, MuxResult};

/// Writes tags and cover art into an audio file without re-encoding.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Returns the name of this muxer implementation.
    fn name(&self) -> &str;

    /// Produces `job.output_path` from the audio and cover inputs.
    async fn mux(&self, job: MuxJob) -> Result<MuxResult, MuxerError>;
}
