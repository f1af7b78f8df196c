//! Trait definitions for the extractor module.

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::ExtractorError;
use super::types::{
    ExtractionContext, ExtractionJob, ExtractionResult, SourceReference, VideoMetadata,
};

/// A tool that can describe a source video and extract its audio.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the name of this extractor implementation.
    fn name(&self) -> &str;

    /// Looks up descriptive metadata without transferring media.
    async fn fetch_metadata(
        &self,
        source: &SourceReference,
        context: &ExtractionContext,
    ) -> Result<VideoMetadata, ExtractorError>;

    /// Produces the catalog query for a source: title and uploader.
    ///
    /// A single attempt; an empty title is a parse error.
    async fn resolve_query(
        &self,
        source: &SourceReference,
        context: &ExtractionContext,
    ) -> Result<String, ExtractorError> {
        let metadata = self.fetch_metadata(source, context).await?;
        let query = metadata.search_query();
        if query.is_empty() {
            return Err(ExtractorError::metadata_parse("metadata has an empty title"));
        }
        Ok(query)
    }

    /// Extracts the audio track to `job.output_path`.
    ///
    /// Each percentage recognized in the tool output replaces the value in
    /// `progress_tx`, at most one per output line; a slow reader sees the
    /// latest. If the receiver is dropped, extraction continues without
    /// progress reporting.
    async fn extract_audio(
        &self,
        job: ExtractionJob,
        progress_tx: watch::Sender<f32>,
    ) -> Result<ExtractionResult, ExtractorError>;
}
