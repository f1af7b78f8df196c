//! Session-cookie material and its periodic refresh.

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::CREDENTIAL_REFRESHES;

use super::config::CredentialsConfig;
use super::error::ProvisionError;

/// File name of the mirrored cookies in the state directory.
const COOKIES_FILE: &str = "cookies.txt";

/// A snapshot of session cookies.
///
/// Runs copy the contents into their own working directory, so a refresh
/// never rewrites a file an extractor process is reading.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub contents: Arc<str>,
    pub fetched_at: DateTime<Utc>,
}

impl SessionCookies {
    /// Writes the cookies to `path`.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.contents.as_bytes()).await
    }
}

/// Process-wide holder of the latest cookies.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<SessionCookies>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest cookies, if any were ever loaded.
    pub async fn current(&self) -> Option<SessionCookies> {
        self.current.read().await.clone()
    }

    /// Replaces the stored cookies.
    pub async fn replace(&self, cookies: SessionCookies) {
        *self.current.write().await = Some(cookies);
    }

    /// Loads cookies mirrored on disk by an earlier process.
    pub async fn load_mirror(&self, state_dir: &Path) -> bool {
        let path = state_dir.join(COOKIES_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) if !contents.trim().is_empty() => {
                let fetched_at = tokio::fs::metadata(&path)
                    .await
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                self.replace(SessionCookies {
                    contents: contents.into(),
                    fetched_at,
                })
                .await;
                info!("Loaded cookies mirrored at {}", path.display());
                true
            }
            _ => false,
        }
    }
}

/// Periodically re-fetches cookie material into a [`CredentialStore`].
pub struct CredentialRefresher {
    config: CredentialsConfig,
    client: Client,
    store: Arc<CredentialStore>,
}

impl CredentialRefresher {
    pub fn new(config: CredentialsConfig, store: Arc<CredentialStore>) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .user_agent(concat!("tubetag/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            config,
            client,
            store,
        })
    }

    /// Whether a cookies source is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.config
            .cookies_url
            .as_ref()
            .is_some_and(|u| !u.trim().is_empty())
    }

    /// Fetches cookies once, mirrors them to disk, and updates the store.
    pub async fn refresh_once(&self) -> Result<SessionCookies, ProvisionError> {
        let url = self
            .config
            .cookies_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ProvisionError::CredentialRefresh("no cookies_url configured".into()))?;

        let mut request = self.client.get(url);
        if let Some(token) = self.config.cookies_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(reqwest::header::AUTHORIZATION, format!("token {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::CredentialRefresh(format!(
                "cookies endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let contents = response.text().await?;
        if contents.trim().is_empty() {
            return Err(ProvisionError::CredentialRefresh(
                "cookies endpoint returned an empty body".into(),
            ));
        }

        let cookies = SessionCookies {
            contents: contents.into(),
            fetched_at: Utc::now(),
        };
        self.mirror(&cookies).await?;
        self.store.replace(cookies.clone()).await;
        Ok(cookies)
    }

    /// Writes the cookies atomically into the state directory.
    async fn mirror(&self, cookies: &SessionCookies) -> Result<PathBuf, ProvisionError> {
        tokio::fs::create_dir_all(&self.config.state_dir).await?;
        let target = self.config.state_dir.join(COOKIES_FILE);
        let partial = target.with_extension("partial");
        cookies.write_to(&partial).await?;
        tokio::fs::rename(&partial, &target).await?;
        debug!("Mirrored cookies to {}", target.display());
        Ok(target)
    }

    /// Spawns the refresh loop. The first refresh happens immediately.
    ///
    /// Failures are logged and the previous cookies stay in use.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.refresh_interval_secs.max(1));
        tokio::spawn(async move {
            if !self.is_enabled() {
                info!("No cookies_url configured, credential refresh disabled");
                return;
            }

            self.store.load_mirror(&self.config.state_dir).await;

            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.refresh_once().await {
                            Ok(cookies) => {
                                CREDENTIAL_REFRESHES.with_label_values(&["ok"]).inc();
                                info!("Cookies updated ({} bytes)", cookies.contents.len());
                            }
                            Err(e) => {
                                CREDENTIAL_REFRESHES.with_label_values(&["failed"]).inc();
                                warn!("Cookie refresh failed, keeping previous cookies: {}", e);
                            }
                        }
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Credential refresher stopping");
                        break;
                    }
                }
            }
        })
    }
}
