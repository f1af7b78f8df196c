//! Mock extractor for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

use crate::extractor::{
    ExtractionContext, ExtractionJob, ExtractionResult, Extractor, ExtractorError,
    SourceReference, VideoMetadata,
};

/// A recorded extraction for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExtraction {
    pub source: SourceReference,
    pub output_path: PathBuf,
    pub cookies_path: Option<PathBuf>,
}

/// Counts live extractions and the ones torn down before completing.
struct ProcessGuard {
    active: Arc<AtomicUsize>,
    killed: Arc<AtomicUsize>,
    completed: bool,
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if !self.completed {
            self.killed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Mock implementation of the Extractor trait.
///
/// Behaves like a well-mannered yt-dlp:
/// - Metadata lookups return the configured [`VideoMetadata`]
/// - Extraction writes a `.part` file, reports the configured progress
///   steps, then renames the partial file to the output path
/// - Failures leave the partial file behind, as a killed process would
///
/// # Example
///
/// ```rust,ignore
/// use tubetag_core::testing::MockExtractor;
///
/// let extractor = MockExtractor::new();
/// extractor.set_progress_steps(vec![10.0, 50.0, 100.0]).await;
/// extractor.set_hang(true); // wait until the run is cancelled
/// ```
#[derive(Clone)]
pub struct MockExtractor {
    metadata: Arc<RwLock<VideoMetadata>>,
    next_metadata_error: Arc<RwLock<Option<ExtractorError>>>,
    next_extract_error: Arc<RwLock<Option<ExtractorError>>>,
    progress_steps: Arc<RwLock<Vec<f32>>>,
    step_delay: Arc<RwLock<Duration>>,
    audio_bytes: Arc<RwLock<Vec<u8>>>,
    hang: Arc<AtomicBool>,
    extractions: Arc<RwLock<Vec<RecordedExtraction>>>,
    metadata_calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    killed: Arc<AtomicUsize>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    /// Create a new mock extractor reporting "Song Title" by "Channel Name".
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(RwLock::new(VideoMetadata {
                title: "Song Title".to_string(),
                uploader: Some("Channel Name".to_string()),
                duration_secs: Some(215.0),
                webpage_url: None,
            })),
            next_metadata_error: Arc::new(RwLock::new(None)),
            next_extract_error: Arc::new(RwLock::new(None)),
            progress_steps: Arc::new(RwLock::new(vec![12.5, 50.0, 87.5, 100.0])),
            step_delay: Arc::new(RwLock::new(Duration::from_millis(5))),
            audio_bytes: Arc::new(RwLock::new(b"mock audio".to_vec())),
            hang: Arc::new(AtomicBool::new(false)),
            extractions: Arc::new(RwLock::new(Vec::new())),
            metadata_calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            killed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the metadata returned for every source.
    pub async fn set_metadata(&self, metadata: VideoMetadata) {
        *self.metadata.write().await = metadata;
    }

    /// Configure the next metadata lookup to fail with the given error.
    pub async fn set_next_metadata_error(&self, error: ExtractorError) {
        *self.next_metadata_error.write().await = Some(error);
    }

    /// Configure the next extraction to fail with the given error.
    pub async fn set_next_extract_error(&self, error: ExtractorError) {
        *self.next_extract_error.write().await = Some(error);
    }

    /// Set the percentages reported during extraction, in order.
    pub async fn set_progress_steps(&self, steps: Vec<f32>) {
        *self.progress_steps.write().await = steps;
    }

    /// Set the delay before each progress step.
    pub async fn set_step_delay(&self, delay: Duration) {
        *self.step_delay.write().await = delay;
    }

    /// When set, extraction blocks until its run is cancelled.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Get all recorded extractions.
    pub async fn recorded_extractions(&self) -> Vec<RecordedExtraction> {
        self.extractions.read().await.clone()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Extractions currently in progress.
    pub fn active_extractions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Extractions torn down before they completed.
    pub fn killed_extractions(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_metadata(
        &self,
        _source: &SourceReference,
        context: &ExtractionContext,
    ) -> Result<VideoMetadata, ExtractorError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if context.cancel.is_cancelled() {
            return Err(ExtractorError::Cancelled);
        }
        if let Some(err) = self.next_metadata_error.write().await.take() {
            return Err(err);
        }
        Ok(self.metadata.read().await.clone())
    }

    async fn extract_audio(
        &self,
        job: ExtractionJob,
        progress_tx: watch::Sender<f32>,
    ) -> Result<ExtractionResult, ExtractorError> {
        let start = Instant::now();
        self.active.fetch_add(1, Ordering::SeqCst);
        let mut guard = ProcessGuard {
            active: self.active.clone(),
            killed: self.killed.clone(),
            completed: false,
        };

        self.extractions.write().await.push(RecordedExtraction {
            source: job.source.clone(),
            output_path: job.output_path.clone(),
            cookies_path: job.context.cookies_path.clone(),
        });

        let partial = job.output_path.with_extension("webm.part");
        if let Some(parent) = partial.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&partial, b"partial").await?;

        let steps = self.progress_steps.read().await.clone();
        let delay = *self.step_delay.read().await;
        for percent in steps {
            tokio::time::sleep(delay).await;
            progress_tx.send_replace(percent);
        }

        if self.hang.load(Ordering::SeqCst) {
            job.context.cancel.cancelled().await;
            return Err(ExtractorError::Cancelled);
        }

        if let Some(err) = self.next_extract_error.write().await.take() {
            guard.completed = true;
            return Err(err);
        }

        let bytes = self.audio_bytes.read().await.clone();
        tokio::fs::write(&job.output_path, &bytes).await?;
        tokio::fs::remove_file(&partial).await?;
        guard.completed = true;

        Ok(ExtractionResult {
            output_path: job.output_path,
            size_bytes: bytes.len() as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
