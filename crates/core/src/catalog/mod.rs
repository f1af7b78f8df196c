//! Track catalog lookup.
//!
//! Turns a free-text query into the single best catalog match, carrying the
//! title, artists, album and artwork location used for tagging.

mod config;
mod spotify;
mod types;

pub use config::{CatalogConfig, SpotifyConfig};
pub use spotify::SpotifyCatalog;
pub use types::{AccessToken, TrackMetadata};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The search returned no usable result.
    #[error("No catalog match for '{query}'")]
    NoMatch { query: String },

    /// The best match carries no artwork.
    #[error("Catalog match '{title}' has no artwork")]
    NoArtwork { title: String },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Obtaining an access token failed.
    #[error("Catalog authentication failed: {0}")]
    Auth(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Client not configured (missing credentials).
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

impl CatalogError {
    pub fn no_match(query: impl Into<String>) -> Self {
        Self::NoMatch {
            query: query.into(),
        }
    }
}

/// A searchable music catalog.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Returns the name of this catalog backend.
    fn name(&self) -> &str;

    /// Returns the single best match for `query`.
    ///
    /// An empty result is [`CatalogError::NoMatch`], never a transport
    /// error; a match without artwork is [`CatalogError::NoArtwork`].
    async fn search_best(&self, query: &str) -> Result<TrackMetadata, CatalogError>;
}
