//! Single-flight provisioning of the extractor and muxer binaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::metrics::PROVISION_ATTEMPTS;

use super::config::ToolsConfig;
use super::error::ProvisionError;
use super::installer::ToolInstaller;

/// The external tools the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// yt-dlp: metadata lookup and audio extraction.
    Extractor,
    /// ffmpeg: muxing audio and artwork with tags.
    Muxer,
}

impl ToolKind {
    /// File name of the binary.
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Extractor => "yt-dlp",
            Self::Muxer => "ffmpeg",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extractor => "extractor",
            Self::Muxer => "muxer",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.binary_name())
    }
}

/// How a tool ended up available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    /// Found at the configured path or on `PATH`.
    System,
    /// Found in the install directory from an earlier download.
    Cached,
    /// Downloaded by this process.
    Downloaded,
}

/// A tool binary ready for use.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedTool {
    pub kind: ToolKind,
    pub binary_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    pub origin: ToolOrigin,
}

/// Both tools a pipeline run needs.
#[derive(Debug, Clone)]
pub struct ReadyTools {
    pub extractor: ProvisionedTool,
    pub muxer: ProvisionedTool,
}

/// Ensures tool binaries are present, installing each at most once at a time.
///
/// Each tool sits behind its own `OnceCell`: concurrent callers wait for the
/// in-flight installation instead of racing it. A failed installation leaves
/// the cell empty, so the next caller tries again.
pub struct ToolProvisioner {
    config: ToolsConfig,
    installer: Arc<dyn ToolInstaller>,
    extractor: OnceCell<ProvisionedTool>,
    muxer: OnceCell<ProvisionedTool>,
}

impl ToolProvisioner {
    pub fn new(config: ToolsConfig, installer: Arc<dyn ToolInstaller>) -> Self {
        Self {
            config,
            installer,
            extractor: OnceCell::new(),
            muxer: OnceCell::new(),
        }
    }

    /// Returns both tools, provisioning whichever is missing.
    pub async fn ensure_ready(&self) -> Result<ReadyTools, ProvisionError> {
        let (extractor, muxer) = tokio::try_join!(
            self.ensure_tool(ToolKind::Extractor),
            self.ensure_tool(ToolKind::Muxer)
        )?;
        Ok(ReadyTools { extractor, muxer })
    }

    /// Returns one tool, provisioning it if needed.
    pub async fn ensure_tool(&self, kind: ToolKind) -> Result<ProvisionedTool, ProvisionError> {
        self.cell(kind)
            .get_or_try_init(|| self.provision(kind))
            .await
            .cloned()
    }

    /// Returns the tool if it has already been provisioned.
    pub fn installed(&self, kind: ToolKind) -> Option<ProvisionedTool> {
        self.cell(kind).get().cloned()
    }

    fn cell(&self, kind: ToolKind) -> &OnceCell<ProvisionedTool> {
        match kind {
            ToolKind::Extractor => &self.extractor,
            ToolKind::Muxer => &self.muxer,
        }
    }

    fn configured_path(&self, kind: ToolKind) -> &Path {
        match kind {
            ToolKind::Extractor => &self.config.extractor_path,
            ToolKind::Muxer => &self.config.muxer_path,
        }
    }

    fn download_url(&self, kind: ToolKind) -> Option<&str> {
        let url = match kind {
            ToolKind::Extractor => self.config.extractor_url.as_deref(),
            ToolKind::Muxer => self.config.muxer_url.as_deref(),
        };
        url.filter(|u| !u.trim().is_empty())
    }

    async fn provision(&self, kind: ToolKind) -> Result<ProvisionedTool, ProvisionError> {
        let result = self.locate_or_install(kind).await;
        let label = if result.is_ok() { "ok" } else { "failed" };
        PROVISION_ATTEMPTS
            .with_label_values(&[kind.as_str(), label])
            .inc();

        match &result {
            Ok(tool) => info!(
                "{} ready at {} ({:?})",
                kind,
                tool.binary_path.display(),
                tool.origin
            ),
            Err(e) => warn!("Provisioning {} failed: {}", kind, e),
        }
        result
    }

    async fn locate_or_install(&self, kind: ToolKind) -> Result<ProvisionedTool, ProvisionError> {
        if let Some(path) = locate_binary(self.configured_path(kind)) {
            return Ok(ProvisionedTool {
                kind,
                binary_path: path,
                installed_at: Utc::now(),
                origin: ToolOrigin::System,
            });
        }

        let cached = self.config.install_dir.join(kind.binary_name());
        if cached.is_file() {
            return Ok(ProvisionedTool {
                kind,
                binary_path: cached,
                installed_at: Utc::now(),
                origin: ToolOrigin::Cached,
            });
        }

        if !self.config.auto_install {
            return Err(ProvisionError::tool_unavailable(
                kind,
                "not found and auto_install is disabled",
            ));
        }

        let url = self
            .download_url(kind)
            .ok_or_else(|| ProvisionError::tool_unavailable(kind, "no download URL configured"))?;

        tokio::fs::create_dir_all(&self.config.install_dir)
            .await
            .map_err(|e| ProvisionError::tool_unavailable(kind, e.to_string()))?;

        let budget = Duration::from_secs(self.config.install_timeout_secs);
        match tokio::time::timeout(budget, self.installer.install(kind, url, &cached)).await {
            Ok(Ok(())) => Ok(ProvisionedTool {
                kind,
                binary_path: cached,
                installed_at: Utc::now(),
                origin: ToolOrigin::Downloaded,
            }),
            Ok(Err(e)) => Err(ProvisionError::tool_unavailable(kind, e.to_string())),
            Err(_) => Err(ProvisionError::tool_unavailable(
                kind,
                format!("installation timed out after {:?}", budget),
            )),
        }
    }
}

/// Resolves a binary path. Bare names are searched on `PATH`.
pub fn locate_binary(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if path.is_absolute() || path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockToolInstaller;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> ToolsConfig {
        ToolsConfig {
            install_dir: dir.path().join("tools"),
            extractor_path: PathBuf::from("/nonexistent/yt-dlp"),
            extractor_url: Some("https://example.com/yt-dlp".to_string()),
            muxer_path: PathBuf::from("/nonexistent/ffmpeg"),
            muxer_url: Some("https://example.com/ffmpeg".to_string()),
            auto_install: true,
            install_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_existing_configured_path_is_used() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("yt-dlp");
        std::fs::write(&binary, b"#!/bin/sh").unwrap();

        let mut config = config_in(&dir);
        config.extractor_path = binary.clone();
        let installer = Arc::new(MockToolInstaller::new());
        let provisioner = ToolProvisioner::new(config, installer.clone());

        let tool = provisioner.ensure_tool(ToolKind::Extractor).await.unwrap();
        assert_eq!(tool.binary_path, binary);
        assert_eq!(tool.origin, ToolOrigin::System);
        assert_eq!(installer.install_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_installation() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(MockToolInstaller::new().with_delay(Duration::from_millis(50)));
        let provisioner = Arc::new(ToolProvisioner::new(config_in(&dir), installer.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let p = Arc::clone(&provisioner);
            handles.push(tokio::spawn(async move {
                p.ensure_tool(ToolKind::Extractor).await
            }));
        }
        for handle in handles {
            let tool = handle.await.unwrap().unwrap();
            assert_eq!(tool.origin, ToolOrigin::Downloaded);
        }

        assert_eq!(installer.install_count(), 1);
        assert!(provisioner.installed(ToolKind::Extractor).is_some());
        assert!(provisioner.installed(ToolKind::Muxer).is_none());
    }

    #[tokio::test]
    async fn test_failed_install_is_retried_next_time() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(MockToolInstaller::new());
        installer.fail_next();
        let provisioner = ToolProvisioner::new(config_in(&dir), installer.clone());

        let err = provisioner.ensure_tool(ToolKind::Muxer).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ToolUnavailable {
                tool: ToolKind::Muxer,
                ..
            }
        ));
        assert!(provisioner.installed(ToolKind::Muxer).is_none());

        let tool = provisioner.ensure_tool(ToolKind::Muxer).await.unwrap();
        assert_eq!(tool.origin, ToolOrigin::Downloaded);
        assert_eq!(installer.install_count(), 2);
    }

    #[tokio::test]
    async fn test_auto_install_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.auto_install = false;
        let installer = Arc::new(MockToolInstaller::new());
        let provisioner = ToolProvisioner::new(config, installer.clone());

        let result = provisioner.ensure_ready().await;
        assert!(matches!(result, Err(ProvisionError::ToolUnavailable { .. })));
        assert_eq!(installer.install_count(), 0);
    }

    #[tokio::test]
    async fn test_cached_binary_is_reused() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.install_dir).unwrap();
        std::fs::write(config.install_dir.join("ffmpeg"), b"bin").unwrap();

        let installer = Arc::new(MockToolInstaller::new());
        let provisioner = ToolProvisioner::new(config, installer.clone());
        let tool = provisioner.ensure_tool(ToolKind::Muxer).await.unwrap();
        assert_eq!(tool.origin, ToolOrigin::Cached);
        assert_eq!(installer.install_count(), 0);
    }

    #[test]
    fn test_locate_binary_missing() {
        assert!(locate_binary(Path::new("definitely-not-a-real-tool-xyz")).is_none());
        assert!(locate_binary(Path::new("")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_binary_on_path() {
        assert!(locate_binary(Path::new("sh")).is_some());
    }
}
