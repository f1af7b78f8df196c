//! Mock tool installer for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::provisioner::{ProvisionError, ToolInstaller, ToolKind};

/// Mock implementation of the ToolInstaller trait.
///
/// Writes a placeholder file instead of downloading anything and counts
/// installations, failed ones included.
#[derive(Debug, Default)]
pub struct MockToolInstaller {
    installs: AtomicUsize,
    fail_next: AtomicBool,
    delay: Duration,
}

impl MockToolInstaller {
    /// Create a new mock installer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each installation take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Configure the next installation to fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of installations attempted.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolInstaller for MockToolInstaller {
    async fn install(&self, kind: ToolKind, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ProvisionError::DownloadFailed {
                url: url.to_string(),
                reason: "mock failure".to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, format!("mock {}", kind.binary_name())).await?;
        Ok(())
    }
}
