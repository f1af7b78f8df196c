//! Mock track catalog for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{CatalogError, TrackCatalog, TrackMetadata};

use super::fixtures;

/// Mock implementation of the TrackCatalog trait.
///
/// Returns one configured track for every query, or no match when the
/// track is cleared. Queries are recorded for assertions.
#[derive(Clone)]
pub struct MockCatalog {
    track: Arc<RwLock<Option<TrackMetadata>>>,
    next_error: Arc<RwLock<Option<CatalogError>>>,
    queries: Arc<RwLock<Vec<String>>>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    /// Create a mock that matches every query to "Song Title" by "Artist".
    pub fn new() -> Self {
        Self {
            track: Arc::new(RwLock::new(Some(fixtures::track_metadata(
                "Song Title",
                &["Artist"],
            )))),
            next_error: Arc::new(RwLock::new(None)),
            queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the track returned for every query.
    pub async fn set_track(&self, track: TrackMetadata) {
        *self.track.write().await = Some(track);
    }

    /// Make every query come back empty.
    pub async fn set_no_match(&self) {
        *self.track.write().await = None;
    }

    /// Configure the next search to fail with the given error.
    pub async fn set_next_error(&self, error: CatalogError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get all recorded queries.
    pub async fn recorded_queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl TrackCatalog for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_best(&self, query: &str) -> Result<TrackMetadata, CatalogError> {
        self.queries.write().await.push(query.to_string());
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        self.track
            .read()
            .await
            .clone()
            .ok_or_else(|| CatalogError::no_match(query))
    }
}
