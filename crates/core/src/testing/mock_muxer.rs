//! Mock muxer for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::muxer::{MuxJob, MuxResult, Muxer, MuxerError};

/// Mock implementation of the Muxer trait.
///
/// The output file holds a one-line tag header followed by the audio
/// bytes, so tests can check what would have been embedded.
#[derive(Clone)]
pub struct MockMuxer {
    jobs: Arc<RwLock<Vec<MuxJob>>>,
    next_error: Arc<RwLock<Option<MuxerError>>>,
}

impl Default for MockMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMuxer {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Configure the next mux to fail with the given error.
    pub async fn set_next_error(&self, error: MuxerError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get all recorded mux jobs.
    pub async fn recorded_jobs(&self) -> Vec<MuxJob> {
        self.jobs.read().await.clone()
    }

    /// Tag header written at the start of each output.
    pub fn header_for(job: &MuxJob) -> String {
        format!(
            "TAGS title={} artist={} album={}\n",
            job.tags.title, job.tags.artist, job.tags.album
        )
    }
}

#[async_trait]
impl Muxer for MockMuxer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn mux(&self, job: MuxJob) -> Result<MuxResult, MuxerError> {
        let start = Instant::now();
        self.jobs.write().await.push(job.clone());

        if let Some(err) = self.next_error.write().await.take() {
            // A failed ffmpeg can leave a truncated output behind.
            tokio::fs::write(&job.output_path, b"truncated").await?;
            return Err(err);
        }

        for input in [&job.audio_path, &job.cover_path] {
            if !input.is_file() {
                return Err(MuxerError::InputNotFound {
                    path: input.clone(),
                });
            }
        }

        let mut contents = Self::header_for(&job).into_bytes();
        contents.extend(tokio::fs::read(&job.audio_path).await?);
        tokio::fs::write(&job.output_path, &contents).await?;

        Ok(MuxResult {
            output_path: job.output_path,
            size_bytes: contents.len() as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
