use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::catalog::CatalogConfig;
use crate::extractor::ExtractorConfig;
use crate::muxer::MuxerConfig;
use crate::pipeline::PipelineConfig;
use crate::provisioner::{CredentialsConfig, ToolsConfig};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub muxer: MuxerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub credentials: SanitizedCredentialsConfig,
    pub catalog: SanitizedCatalogConfig,
    pub extractor: ExtractorConfig,
    pub muxer: MuxerConfig,
    pub pipeline: PipelineConfig,
}

/// Sanitized credentials config (URL and token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCredentialsConfig {
    pub cookies_url_configured: bool,
    pub cookies_token_configured: bool,
    pub refresh_interval_secs: u64,
}

/// Sanitized catalog config (client secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCatalogConfig {
    pub backend: String,
    pub client_id_configured: bool,
    pub client_secret_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_popularity: Option<u32>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            tools: config.tools.clone(),
            credentials: SanitizedCredentialsConfig {
                cookies_url_configured: config.credentials.cookies_url.is_some(),
                cookies_token_configured: config
                    .credentials
                    .cookies_token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                refresh_interval_secs: config.credentials.refresh_interval_secs,
            },
            catalog: SanitizedCatalogConfig {
                backend: "spotify".to_string(),
                client_id_configured: !config.catalog.spotify.client_id.is_empty(),
                client_secret_configured: !config.catalog.spotify.client_secret.is_empty(),
                market: config.catalog.spotify.market.clone(),
                min_popularity: config.catalog.min_popularity,
            },
            extractor: config.extractor.clone(),
            muxer: config.muxer.clone(),
            pipeline: config.pipeline.clone(),
        }
    }
}
