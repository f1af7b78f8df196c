//! Per-run working directory.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::provisioner::SessionCookies;

// Intermediate names start with '_', which output stems never contain, so
// the artifact can never overwrite an input.
const AUDIO_FILE: &str = "_audio.mp3";
const COVER_FILE: &str = "_cover.jpg";
const COOKIES_FILE: &str = "_cookies.txt";

/// Directory owned by exactly one run: `<work_dir>/<run_id>`.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    dir: PathBuf,
}

impl RunWorkspace {
    /// Creates the run directory. Fails if it already exists.
    pub async fn create(root: &Path, run_id: Uuid) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let dir = root.join(run_id.to_string());
        tokio::fs::create_dir(&dir).await?;
        debug!("Created run directory {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn audio_path(&self) -> PathBuf {
        self.dir.join(AUDIO_FILE)
    }

    pub fn cover_path(&self) -> PathBuf {
        self.dir.join(COVER_FILE)
    }

    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.mp3", stem))
    }

    /// Writes a private copy of the cookies for this run.
    pub async fn install_cookies(&self, cookies: &SessionCookies) -> io::Result<PathBuf> {
        let path = self.dir.join(COOKIES_FILE);
        cookies.write_to(&path).await?;
        Ok(path)
    }

    /// Removes everything in the directory except `keep`.
    pub async fn remove_intermediates(&self, keep: &Path) -> io::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path == keep {
                continue;
            }
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            if let Err(e) = result {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Removes the whole directory. A missing directory is not an error.
    pub async fn remove(&self) -> io::Result<()> {
        remove_run_dir(&self.dir).await
    }

    /// Removes the directory, logging instead of failing.
    pub async fn discard(&self) {
        if let Err(e) = self.remove().await {
            warn!("Failed to remove run directory {}: {}", self.dir.display(), e);
        }
    }
}

pub(crate) async fn remove_run_dir(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!("Removed run directory {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
