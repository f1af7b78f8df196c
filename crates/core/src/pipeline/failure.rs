//! Mapping of component errors onto run failures.

use crate::artwork::ArtworkError;
use crate::catalog::CatalogError;
use crate::extractor::ExtractorError;
use crate::muxer::MuxerError;

use super::types::{FailureKind, PipelineError, RunStage};

/// Last non-empty line of a stderr tail.
fn stderr_summary(stderr: &str) -> Option<&str> {
    stderr.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

pub(crate) fn from_extractor(stage: RunStage, error: ExtractorError) -> PipelineError {
    let kind = match &error {
        ExtractorError::EmptySource | ExtractorError::SourceUnresolvable { .. } => {
            FailureKind::SourceUnresolvable
        }
        ExtractorError::ToolUnavailable(_) => FailureKind::ToolUnavailable,
        ExtractorError::MetadataParse { .. } => FailureKind::MetadataParseError,
        ExtractorError::AcquisitionFailed { .. } => FailureKind::AcquisitionFailed,
        ExtractorError::Timeout { .. } => FailureKind::Timeout,
        ExtractorError::Cancelled => FailureKind::Cancelled,
        ExtractorError::Io(_) => FailureKind::Internal,
    };

    let message = match &error {
        ExtractorError::AcquisitionFailed { stderr, .. } => match stderr_summary(stderr) {
            Some(line) => format!("{}: {}", error, line),
            None => error.to_string(),
        },
        _ => error.to_string(),
    };

    PipelineError::new(stage, kind, message)
}

pub(crate) fn from_catalog(stage: RunStage, error: CatalogError) -> PipelineError {
    let kind = match &error {
        CatalogError::NoMatch { .. } => FailureKind::NoMatch,
        CatalogError::NoArtwork { .. } => FailureKind::ArtworkUnavailable,
        CatalogError::Http(_)
        | CatalogError::Api { .. }
        | CatalogError::Auth(_)
        | CatalogError::Parse(_)
        | CatalogError::NotConfigured(_) => FailureKind::CatalogTransportError,
    };
    PipelineError::new(stage, kind, error.to_string())
}

pub(crate) fn from_artwork(stage: RunStage, error: ArtworkError) -> PipelineError {
    let kind = match &error {
        ArtworkError::Unavailable { .. } => FailureKind::ArtworkUnavailable,
        ArtworkError::Io(_) => FailureKind::Internal,
    };
    PipelineError::new(stage, kind, error.to_string())
}

pub(crate) fn from_muxer(stage: RunStage, error: MuxerError) -> PipelineError {
    let kind = match &error {
        MuxerError::ToolUnavailable(_) => FailureKind::ToolUnavailable,
        MuxerError::MuxFailed { .. } => FailureKind::MuxFailed,
        MuxerError::Timeout { .. } => FailureKind::Timeout,
        MuxerError::Cancelled => FailureKind::Cancelled,
        MuxerError::InputNotFound { .. } | MuxerError::Io(_) => FailureKind::Internal,
    };

    let message = match &error {
        MuxerError::MuxFailed {
            stderr: Some(stderr),
            ..
        } => match stderr_summary(stderr) {
            Some(line) => format!("{}: {}", error, line),
            None => error.to_string(),
        },
        _ => error.to_string(),
    };

    PipelineError::new(stage, kind, message)
}
