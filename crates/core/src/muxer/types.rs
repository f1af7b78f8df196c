//! Types for the muxer module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::catalog::TrackMetadata;

/// Tags written into the output file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedTags {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl EmbeddedTags {
    /// Convert to ffmpeg metadata arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-metadata".to_string(),
            format!("title={}", self.title),
            "-metadata".to_string(),
            format!("artist={}", self.artist),
            "-metadata".to_string(),
            format!("album={}", self.album),
        ]
    }
}

impl From<&TrackMetadata> for EmbeddedTags {
    fn from(track: &TrackMetadata) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist_display(),
            album: track.album.clone(),
        }
    }
}

/// A tag-and-cover mux request.
#[derive(Debug, Clone)]
pub struct MuxJob {
    /// Extracted audio.
    pub audio_path: PathBuf,
    /// Cover image embedded as the attached picture.
    pub cover_path: PathBuf,
    pub output_path: PathBuf,
    pub tags: EmbeddedTags,
    pub cancel: CancellationToken,
}

/// Result of a successful mux.
#[derive(Debug, Clone)]
pub struct MuxResult {
    pub output_path: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

/// Derives a safe output file stem from a track title.
///
/// Keeps ASCII letters, digits and spaces, trims the ends, and falls back to
/// `"track"` when nothing remains.
pub fn sanitize_file_stem(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        "track".to_string()
    } else {
        trimmed.to_string()
    }
}
