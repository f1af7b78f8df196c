//! Configuration for the track catalog.

use serde::{Deserialize, Serialize};

/// Catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Spotify Web API credentials.
    pub spotify: SpotifyConfig,

    /// Minimum popularity (0-100) for a top result to count as a match.
    /// Unset accepts any top result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_popularity: Option<u32>,
}

/// Spotify Web API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,

    /// ISO 3166-1 alpha-2 market used to filter search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,

    /// Accounts service base URL (default: https://accounts.spotify.com).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts_url: Option<String>,

    /// Web API base URL (default: https://api.spotify.com).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}
