//! Error types for the provisioner module.

use thiserror::Error;

use super::tools::ToolKind;

/// Errors that can occur while provisioning tools or credentials.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required tool could not be located or installed.
    #[error("{tool} is unavailable: {reason}")]
    ToolUnavailable { tool: ToolKind, reason: String },

    /// A download returned a non-success status or an empty body.
    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// A downloaded archive could not be unpacked.
    #[error("Failed to unpack archive: {reason}")]
    UnpackFailed { reason: String },

    /// Credential material could not be refreshed.
    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Creates a tool unavailable error.
    pub fn tool_unavailable(tool: ToolKind, reason: impl Into<String>) -> Self {
        Self::ToolUnavailable {
            tool,
            reason: reason.into(),
        }
    }
}
