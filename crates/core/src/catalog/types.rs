//! Types for the track catalog.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The catalog's best match for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Catalog identifier of the track.
    pub catalog_id: String,
    pub title: String,
    /// Artist names in catalog order.
    pub artists: Vec<String>,
    pub album: String,
    /// URL of the album artwork, the largest image the catalog offers.
    pub artwork_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TrackMetadata {
    /// All artists joined with ", ", as written into the artist tag.
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }

    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

/// A client-credentials access token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token that expires `expires_in_secs` after `now`.
    pub fn new(value: impl Into<String>, expires_in_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at: now + Duration::seconds(expires_in_secs as i64),
        }
    }

    /// True while the token remains valid for at least `margin` past `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}
