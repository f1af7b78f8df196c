//! Spotify Web API client.
//!
//! Uses the client-credentials flow: no user context, a short-lived bearer
//! token obtained from the accounts service and reused until shortly
//! before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::metrics::observe_external_call;

use super::config::SpotifyConfig;
use super::types::{AccessToken, TrackMetadata};
use super::{CatalogError, TrackCatalog};

const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const DEFAULT_API_URL: &str = "https://api.spotify.com";

/// Tokens closer than this to expiry are replaced before use.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Spotify catalog client.
pub struct SpotifyCatalog {
    client: Client,
    client_id: String,
    client_secret: String,
    market: Option<String>,
    min_popularity: Option<u32>,
    accounts_url: String,
    api_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyCatalog {
    /// Create a new Spotify client.
    pub fn new(config: SpotifyConfig, min_popularity: Option<u32>) -> Result<Self, CatalogError> {
        if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
            return Err(CatalogError::NotConfigured(
                "Spotify client_id and client_secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            client_id: config.client_id,
            client_secret: config.client_secret,
            market: config.market,
            min_popularity,
            accounts_url: config
                .accounts_url
                .unwrap_or_else(|| DEFAULT_ACCOUNTS_URL.to_string()),
            api_url: config
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: Mutex::new(None),
        })
    }

    /// Returns a valid access token, requesting a new one if needed.
    ///
    /// The lock is held across the token request so concurrent searches
    /// share one refresh.
    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.token.lock().await;
        let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now(), margin) {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn request_token(&self) -> Result<AccessToken, CatalogError> {
        let url = format!("{}/api/token", self.accounts_url);
        debug!("Requesting Spotify access token");

        let start = Instant::now();
        let result = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                observe_external_call("spotify", "token", false, start.elapsed().as_secs_f64());
                return Err(CatalogError::Auth(e.to_string()));
            }
        };

        let status = response.status();
        observe_external_call(
            "spotify",
            "token",
            status.is_success(),
            start.elapsed().as_secs_f64(),
        );
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(format!("{} - {}", status.as_u16(), body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Failed to parse token response: {}", e)))?;

        Ok(AccessToken::new(
            token.access_token,
            token.expires_in,
            Utc::now(),
        ))
    }

    async fn send_search(&self, query: &str, token: &str) -> Result<reqwest::Response, CatalogError> {
        let url = format!("{}/v1/search", self.api_url);
        let mut params = vec![("q", query), ("type", "track"), ("limit", "1")];
        if let Some(market) = &self.market {
            params.push(("market", market.as_str()));
        }

        let start = Instant::now();
        let result = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await;

        let ok = matches!(&result, Ok(r) if r.status().is_success());
        observe_external_call("spotify", "search", ok, start.elapsed().as_secs_f64());
        Ok(result?)
    }

    /// Picks the top search result, applying the popularity threshold.
    fn best_match(
        response: SearchResponse,
        query: &str,
        min_popularity: Option<u32>,
    ) -> Result<TrackMetadata, CatalogError> {
        let track = response
            .tracks
            .and_then(|page| page.items.into_iter().next())
            .ok_or_else(|| CatalogError::no_match(query))?;

        if let (Some(min), Some(popularity)) = (min_popularity, track.popularity) {
            if popularity < min {
                debug!(
                    "Rejecting '{}' with popularity {} below {}",
                    track.name, popularity, min
                );
                return Err(CatalogError::no_match(query));
            }
        }

        let artwork_url = track
            .album
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or_else(|| CatalogError::NoArtwork {
                title: track.name.clone(),
            })?;

        Ok(TrackMetadata {
            catalog_id: track.id,
            title: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album: track.album.name,
            artwork_url,
            popularity: track.popularity,
            duration_ms: track.duration_ms,
        })
    }
}

#[async_trait]
impl TrackCatalog for SpotifyCatalog {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn search_best(&self, query: &str) -> Result<TrackMetadata, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalogError::no_match(query));
        }

        debug!("Spotify search: query='{}'", query);

        let token = self.access_token().await?;
        let mut response = self.send_search(query, &token).await?;

        // A token revoked early is replaced once.
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Spotify rejected the access token, requesting a new one");
            self.invalidate_token().await;
            let token = self.access_token().await?;
            response = self.send_search(query, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let search: SearchResponse = response.json().await.map_err(|e| {
            CatalogError::Parse(format!("Failed to parse search response: {}", e))
        })?;

        Self::best_match(search, query, self.min_popularity)
    }
}

// ============================================================================
// Spotify API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: SpotifyAlbum,
    #[serde(default)]
    popularity: Option<u32>,
    #[serde(default)]
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}
