//! Error types for the muxer module.

use std::path::PathBuf;
use thiserror::Error;

use crate::provisioner::ProvisionError;

/// Errors that can occur while writing the tagged output.
#[derive(Debug, Error)]
pub enum MuxerError {
    /// The muxer binary is not available.
    #[error(transparent)]
    ToolUnavailable(#[from] ProvisionError),

    /// An input file is missing.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The mux process failed.
    #[error("Mux failed: {reason}")]
    MuxFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The mux exceeded its time budget.
    #[error("Mux timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The run was cancelled.
    #[error("Mux cancelled")]
    Cancelled,

    /// I/O error during muxing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuxerError {
    pub fn mux_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::MuxFailed {
            reason: reason.into(),
            stderr,
        }
    }
}
