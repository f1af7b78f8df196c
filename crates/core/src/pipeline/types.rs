//! Types for the pipeline module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::TrackMetadata;

/// Stage of a pipeline run. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Created,
    ResolvingMetadata,
    MatchingCatalog,
    AcquiringAudio,
    FetchingArtwork,
    Muxing,
    Finished,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ResolvingMetadata => "resolving_metadata",
            Self::MatchingCatalog => "matching_catalog",
            Self::AcquiringAudio => "acquiring_audio",
            Self::FetchingArtwork => "fetching_artwork",
            Self::Muxing => "muxing",
            Self::Finished => "finished",
        }
    }

    /// Human-readable description used as the event message.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Created => "Waiting to start",
            Self::ResolvingMetadata => "Reading video metadata",
            Self::MatchingCatalog => "Searching the catalog",
            Self::AcquiringAudio => "Downloading audio",
            Self::FetchingArtwork => "Fetching cover art",
            Self::Muxing => "Writing tags",
            Self::Finished => "Finished",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended without an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolUnavailable,
    SourceUnresolvable,
    MetadataParseError,
    NoMatch,
    CatalogTransportError,
    AcquisitionFailed,
    ArtworkUnavailable,
    MuxFailed,
    Timeout,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolUnavailable => "tool_unavailable",
            Self::SourceUnresolvable => "source_unresolvable",
            Self::MetadataParseError => "metadata_parse_error",
            Self::NoMatch => "no_match",
            Self::CatalogTransportError => "catalog_transport_error",
            Self::AcquisitionFailed => "acquisition_failed",
            Self::ArtworkUnavailable => "artwork_unavailable",
            Self::MuxFailed => "mux_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Failures caused by the caller's input rather than the service.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::NoMatch | Self::SourceUnresolvable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single failure a run ends with.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} during {stage}: {message}")]
pub struct PipelineError {
    /// Stage that was executing when the run failed.
    pub stage: RunStage,
    pub kind: FailureKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(stage: RunStage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled(stage: RunStage) -> Self {
        Self::new(stage, FailureKind::Cancelled, "Run was cancelled")
    }
}

/// Where a run stands from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Still executing or waiting for a slot.
    Running,
    /// Artifact ready for collection.
    Succeeded,
    Failed,
    /// Artifact collected and removed.
    Delivered,
    /// Artifact removed after waiting too long for collection.
    Expired,
}

/// Produced file, as described before collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub file_name: String,
    pub size_bytes: u64,
}

/// Snapshot of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub source: String,
    pub stage: RunStage,
    pub outcome: RunOutcome,
    /// Latest acquisition percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// A collected artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// MIME type of every artifact the pipeline produces.
    pub const CONTENT_TYPE: &'static str = "audio/mpeg";
}

/// Returned by `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: Uuid,
}

/// Errors from looking up or collecting a run.
#[derive(Debug, Error)]
pub enum RunLookupError {
    #[error("Run not found: {0}")]
    NotFound(Uuid),

    #[error("Run {0} has not finished")]
    NotFinished(Uuid),

    #[error("Run failed: {0}")]
    Failed(PipelineError),

    /// Delivered already, or expired before collection.
    #[error("Artifact of run {0} is no longer available")]
    Gone(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(RunStage::Created < RunStage::ResolvingMetadata);
        assert!(RunStage::AcquiringAudio < RunStage::FetchingArtwork);
        assert!(RunStage::Muxing < RunStage::Finished);
    }

    #[test]
    fn test_user_facing_failures() {
        assert!(FailureKind::NoMatch.is_user_facing());
        assert!(FailureKind::SourceUnresolvable.is_user_facing());
        assert!(!FailureKind::AcquisitionFailed.is_user_facing());
        assert!(!FailureKind::ToolUnavailable.is_user_facing());
        assert!(!FailureKind::Cancelled.is_user_facing());
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::new(RunStage::Muxing, FailureKind::MuxFailed, "exit 1");
        assert_eq!(err.to_string(), "mux_failed during muxing: exit 1");
    }

    #[test]
    fn test_failure_kind_serializes_like_as_str() {
        for kind in [
            FailureKind::NoMatch,
            FailureKind::CatalogTransportError,
            FailureKind::MetadataParseError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
