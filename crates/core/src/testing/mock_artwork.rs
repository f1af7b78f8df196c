//! Mock artwork fetcher for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::artwork::{ArtworkError, ArtworkFetcher};

/// Mock implementation of the ArtworkFetcher trait.
///
/// Writes a fixed image payload to the destination and records the URLs
/// it was asked for.
#[derive(Clone)]
pub struct MockArtworkFetcher {
    image: Arc<RwLock<Vec<u8>>>,
    unavailable: Arc<RwLock<bool>>,
    fetched: Arc<RwLock<Vec<String>>>,
}

impl Default for MockArtworkFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockArtworkFetcher {
    pub fn new() -> Self {
        Self {
            image: Arc::new(RwLock::new(b"\xFF\xD8\xFFmock jpeg".to_vec())),
            unavailable: Arc::new(RwLock::new(false)),
            fetched: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Make every fetch fail as if the image host were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Get all fetched URLs.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }
}

#[async_trait]
impl ArtworkFetcher for MockArtworkFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ArtworkError> {
        self.fetched.write().await.push(url.to_string());
        if *self.unavailable.read().await {
            return Err(ArtworkError::Unavailable {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            });
        }
        let image = self.image.read().await.clone();
        tokio::fs::write(dest, &image).await?;
        Ok(image.len() as u64)
    }
}
