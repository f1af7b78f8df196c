//! Cover art download.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::metrics::observe_external_call;

/// Errors from fetching artwork.
#[derive(Debug, Error)]
pub enum ArtworkError {
    /// The image could not be downloaded.
    #[error("Artwork unavailable from {url}: {reason}")]
    Unavailable { url: String, reason: String },

    /// The image could not be written to disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtworkError {
    fn unavailable(url: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Downloads a cover image to a local file.
#[async_trait]
pub trait ArtworkFetcher: Send + Sync {
    /// Writes the image at `url` to `dest` and returns its size in bytes.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ArtworkError>;
}

/// reqwest-backed artwork fetcher.
pub struct HttpArtworkFetcher {
    client: Client,
}

impl HttpArtworkFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtworkFetcher for HttpArtworkFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ArtworkError> {
        debug!("Fetching artwork from {}", url);
        let start = Instant::now();

        let result = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ArtworkError::unavailable(url, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ArtworkError::unavailable(url, format!("HTTP {}", status)));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ArtworkError::unavailable(url, e.to_string()))?;
            if bytes.is_empty() {
                return Err(ArtworkError::unavailable(url, "empty response body"));
            }
            Ok(bytes)
        }
        .await;

        observe_external_call(
            "artwork",
            "fetch",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        let bytes = result?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
