use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubetag_core::{
    load_config, validate_config, ArtworkFetcher, CredentialRefresher, CredentialStore,
    Extractor, FfmpegMuxer, HttpArtworkFetcher, HttpToolInstaller, Muxer, PipelineDeps,
    PipelineRunner, SpotifyCatalog, ToolProvisioner, TrackCatalog, YtDlpExtractor,
};
use tubetag_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TUBETAG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Config fingerprint
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        "tubetag {} starting (config {})",
        VERSION,
        &config_hash[..16]
    );
    info!("Work directory: {:?}", config.pipeline.work_dir);

    // Tool provisioning
    let installer = HttpToolInstaller::new().context("Failed to create tool installer")?;
    let tools = Arc::new(ToolProvisioner::new(config.tools.clone(), Arc::new(installer)));

    // Session cookies
    let shutdown = CancellationToken::new();
    let credentials = Arc::new(CredentialStore::new());
    if credentials.load_mirror(&config.credentials.state_dir).await {
        info!("Using mirrored cookies until the first refresh");
    }
    let refresher = CredentialRefresher::new(config.credentials.clone(), Arc::clone(&credentials))
        .context("Failed to create credential refresher")?;
    let refresher_handle = refresher.spawn(shutdown.clone());

    // Pipeline components
    let extractor: Arc<dyn Extractor> = Arc::new(YtDlpExtractor::new(
        config.extractor.clone(),
        Arc::clone(&tools),
    ));
    let catalog: Arc<dyn TrackCatalog> = Arc::new(
        SpotifyCatalog::new(config.catalog.spotify.clone(), config.catalog.min_popularity)
            .context("Failed to create catalog client")?,
    );
    let artwork: Arc<dyn ArtworkFetcher> = Arc::new(
        HttpArtworkFetcher::new(Duration::from_secs(config.pipeline.artwork_timeout_secs))
            .context("Failed to create artwork fetcher")?,
    );
    let muxer: Arc<dyn Muxer> = Arc::new(FfmpegMuxer::new(
        config.muxer.clone(),
        Arc::clone(&tools),
    ));
    info!(
        "Pipeline: extractor={}, catalog={}, muxer={}",
        extractor.name(),
        catalog.name(),
        muxer.name()
    );

    tokio::fs::create_dir_all(&config.pipeline.work_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", config.pipeline.work_dir))?;

    let runner = Arc::new(PipelineRunner::new(
        config.pipeline.clone(),
        PipelineDeps {
            extractor,
            catalog,
            artwork,
            muxer,
            credentials,
        },
    ));
    let reaper_handle = runner.spawn_reaper();

    // Prefetch tools in the background; runs retry on their own if this fails
    let prefetch_tools = Arc::clone(&tools);
    tokio::spawn(async move {
        match prefetch_tools.ensure_ready().await {
            Ok(ready) => info!(
                "Tools ready: yt-dlp at {:?}, ffmpeg at {:?}",
                ready.extractor.binary_path, ready.muxer.binary_path
            ),
            Err(e) => warn!("Tool prefetch failed, will retry on first run: {}", e),
        }
    });

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&runner)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    shutdown.cancel();
    runner.shutdown().await;
    let _ = reaper_handle.await;
    let _ = refresher_handle.await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
