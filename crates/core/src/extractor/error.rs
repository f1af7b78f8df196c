//! Error types for the extractor module.

use thiserror::Error;

use crate::provisioner::ProvisionError;

/// Errors that can occur during metadata lookup or audio extraction.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The source reference was empty.
    #[error("Source reference is empty")]
    EmptySource,

    /// The extractor binary is not available.
    #[error(transparent)]
    ToolUnavailable(#[from] ProvisionError),

    /// The extractor could not resolve the source.
    #[error("Source could not be resolved: {reason}")]
    SourceUnresolvable { reason: String },

    /// The extractor's metadata output could not be parsed.
    #[error("Failed to parse extractor metadata: {reason}")]
    MetadataParse { reason: String },

    /// The extraction process failed.
    #[error("Audio extraction failed (exit code {exit_code:?})")]
    AcquisitionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The extraction process exceeded its time budget.
    #[error("Extractor timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The run was cancelled.
    #[error("Extraction cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    pub fn source_unresolvable(reason: impl Into<String>) -> Self {
        Self::SourceUnresolvable {
            reason: reason.into(),
        }
    }

    pub fn metadata_parse(reason: impl Into<String>) -> Self {
        Self::MetadataParse {
            reason: reason.into(),
        }
    }
}
