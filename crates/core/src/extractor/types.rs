//! Types for the extractor module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::error::ExtractorError;

/// Caller-supplied link or identifier of the source video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceReference(String);

impl SourceReference {
    /// Validates and wraps a source reference. Only emptiness is rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self, ExtractorError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ExtractorError::EmptySource);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SourceReference {
    type Error = ExtractorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceReference> for String {
    fn from(value: SourceReference) -> Self {
        value.0
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive metadata of the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    /// Uploader, or channel name when no uploader is reported.
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
}

impl VideoMetadata {
    /// Free-text catalog query: title and uploader joined by a space.
    pub fn search_query(&self) -> String {
        match self.uploader.as_deref().map(str::trim) {
            Some(uploader) if !uploader.is_empty() => {
                format!("{} {}", self.title.trim(), uploader)
            }
            _ => self.title.trim().to_string(),
        }
    }
}

/// Per-invocation context shared by metadata lookup and extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    /// Cookies file private to the run, if cookie material is available.
    pub cookies_path: Option<PathBuf>,
    /// Cancels the invocation and kills the tool process.
    pub cancel: CancellationToken,
}

/// An audio extraction request.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub source: SourceReference,
    /// Where the extracted audio file must end up.
    pub output_path: PathBuf,
    pub context: ExtractionContext,
}

/// Result of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub output_path: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
}
