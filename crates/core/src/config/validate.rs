use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Catalog credentials are present
/// - Timeouts and limits are non-zero
/// - The extracted audio format is mp3
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.catalog.spotify.client_id.trim().is_empty()
        || config.catalog.spotify.client_secret.trim().is_empty()
    {
        return Err(ConfigError::ValidationError(
            "catalog.spotify.client_id and client_secret are required".to_string(),
        ));
    }

    if let Some(min) = config.catalog.min_popularity {
        if min > 100 {
            return Err(ConfigError::ValidationError(
                "catalog.min_popularity must be between 0 and 100".to_string(),
            ));
        }
    }

    if config.credentials.refresh_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "credentials.refresh_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.extractor.metadata_timeout_secs == 0 || config.extractor.download_timeout_secs == 0
    {
        return Err(ConfigError::ValidationError(
            "extractor timeouts cannot be 0".to_string(),
        ));
    }

    // Artifacts are ID3-tagged MP3 files.
    if config.extractor.audio_format != "mp3" {
        return Err(ConfigError::ValidationError(format!(
            "extractor.audio_format must be \"mp3\", got \"{}\"",
            config.extractor.audio_format
        )));
    }

    if config.muxer.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "muxer.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.pipeline.max_concurrent_runs == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.max_concurrent_runs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
