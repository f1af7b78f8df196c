//! Fetch-and-install of tool binaries.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::process::{run_tool, StdoutMode};

use super::error::ProvisionError;
use super::tools::ToolKind;

/// Installs a tool binary at a destination path.
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Downloads the tool from `url` and leaves an executable at `dest`.
    async fn install(&self, kind: ToolKind, url: &str, dest: &Path) -> Result<(), ProvisionError>;
}

/// Installer that downloads binaries (or static-build archives) over HTTP.
pub struct HttpToolInstaller {
    client: Client,
}

impl HttpToolInstaller {
    pub fn new() -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .user_agent(concat!("tubetag/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProvisionError::DownloadFailed {
                url: url.to_string(),
                reason: "empty body".to_string(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn unpack(
        &self,
        kind: ToolKind,
        archive_flag: &str,
        bytes: &[u8],
        dest: &Path,
    ) -> Result<(), ProvisionError> {
        let staging = staging_dir(dest);
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        let archive = staging.join("archive");
        tokio::fs::write(&archive, bytes).await?;

        let cancel = CancellationToken::new();
        let output = run_tool(
            Path::new("tar"),
            [
                archive_flag.to_string(),
                archive.to_string_lossy().to_string(),
                "-C".to_string(),
                staging.to_string_lossy().to_string(),
            ],
            Duration::from_secs(300),
            &cancel,
            StdoutMode::Capture,
        )
        .await
        .map_err(|e| ProvisionError::UnpackFailed {
            reason: e.to_string(),
        })?;

        if !output.success() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(ProvisionError::UnpackFailed {
                reason: output.stderr_tail,
            });
        }

        let found = find_file(&staging, kind.binary_name()).await?;
        let result = match found {
            Some(binary) => tokio::fs::rename(&binary, dest).await.map_err(Into::into),
            None => Err(ProvisionError::UnpackFailed {
                reason: format!("{} not found in archive", kind.binary_name()),
            }),
        };

        let _ = tokio::fs::remove_dir_all(&staging).await;
        result
    }
}

#[async_trait]
impl ToolInstaller for HttpToolInstaller {
    async fn install(&self, kind: ToolKind, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        info!("Downloading {} from {}", kind.binary_name(), url);
        let bytes = self.download(url).await?;
        debug!("Downloaded {} bytes for {}", bytes.len(), kind.binary_name());

        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        match archive_flag(url) {
            Some(flag) => self.unpack(kind, flag, &bytes, dest).await?,
            None => {
                let partial = dest.with_extension("partial");
                tokio::fs::write(&partial, &bytes).await?;
                tokio::fs::rename(&partial, dest).await?;
            }
        }

        set_executable(dest).await?;
        info!("Installed {} at {}", kind.binary_name(), dest.display());
        Ok(())
    }
}

/// Returns the tar extraction flag for archive URLs.
fn archive_flag(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.ends_with(".tar.xz") || path.ends_with(".txz") {
        Some("-xJf")
    } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
        Some("-xzf")
    } else {
        None
    }
}

fn staging_dir(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "tool".to_string());
    dest.with_file_name(format!(".{}-staging", name))
}

/// Breadth-first search for a regular file named `name`, at most four levels deep.
async fn find_file(root: &Path, name: &str) -> Result<Option<PathBuf>, ProvisionError> {
    let mut pending = vec![(root.to_path_buf(), 0usize)];
    while let Some((dir, depth)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_file() && entry.file_name() == name {
                return Ok(Some(path));
            }
            if file_type.is_dir() && depth < 4 {
                pending.push((path, depth + 1));
            }
        }
    }
    Ok(None)
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}
