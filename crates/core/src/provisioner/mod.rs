//! Provisioning of external tools and credential material.
//!
//! Before a pipeline run can start, the extractor (yt-dlp) and muxer
//! (ffmpeg) binaries must be present and session cookies should be fresh.
//!
//! - [`ToolProvisioner`] locates or installs each binary behind a
//!   single-flight guard shared by every run.
//! - [`CredentialRefresher`] re-fetches cookies on a fixed timer into a
//!   [`CredentialStore`] that runs read without waiting on the refresh.
//!
//! # Example
//!
//! ```ignore
//! use tubetag_core::provisioner::{HttpToolInstaller, ToolProvisioner, ToolsConfig};
//!
//! let provisioner = ToolProvisioner::new(
//!     ToolsConfig::default(),
//!     Arc::new(HttpToolInstaller::new()?),
//! );
//! let tools = provisioner.ensure_ready().await?;
//! println!("yt-dlp at {}", tools.extractor.binary_path.display());
//! ```

mod config;
mod credentials;
mod error;
mod installer;
mod tools;

pub use config::{CredentialsConfig, ToolsConfig};
pub use credentials::{CredentialRefresher, CredentialStore, SessionCookies};
pub use error::ProvisionError;
pub use installer::{HttpToolInstaller, ToolInstaller};
pub use tools::{locate_binary, ProvisionedTool, ReadyTools, ToolKind, ToolOrigin, ToolProvisioner};
