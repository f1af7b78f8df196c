//! yt-dlp based extractor implementation.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::process::{run_tool, ProcessError, StdoutMode};
use crate::provisioner::{ProvisionError, ToolKind, ToolProvisioner};

use super::config::ExtractorConfig;
use super::error::ExtractorError;
use super::traits::Extractor;
use super::types::{
    ExtractionContext, ExtractionJob, ExtractionResult, SourceReference, VideoMetadata,
};

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)%").expect("valid percent regex"));

/// Extracts the first percentage in a line of yt-dlp output.
///
/// Values outside `0..=100` are ignored.
pub fn parse_progress_percent(line: &str) -> Option<f32> {
    let caps = PERCENT_RE.captures(line)?;
    let value = caps.get(1)?.as_str().parse::<f32>().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

/// yt-dlp based extractor.
pub struct YtDlpExtractor {
    config: ExtractorConfig,
    tools: Arc<ToolProvisioner>,
}

impl YtDlpExtractor {
    pub fn new(config: ExtractorConfig, tools: Arc<ToolProvisioner>) -> Self {
        Self { config, tools }
    }

    fn cookie_args(context: &ExtractionContext) -> Vec<String> {
        match &context.cookies_path {
            Some(path) => vec!["--cookies".to_string(), path.to_string_lossy().to_string()],
            None => Vec::new(),
        }
    }

    /// Builds arguments for a metadata-only lookup.
    fn build_metadata_args(
        &self,
        source: &SourceReference,
        context: &ExtractionContext,
    ) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(Self::cookie_args(context));
        args.extend(self.config.extra_args.iter().cloned());
        // Keep a source starting with '-' from being read as an option.
        args.push("--".to_string());
        args.push(source.as_str().to_string());
        args
    }

    /// Builds arguments for audio extraction.
    ///
    /// yt-dlp writes the download under the template and then replaces the
    /// extension after conversion, so the template uses `%(ext)s`.
    fn build_download_args(
        &self,
        source: &SourceReference,
        output_path: &Path,
        ffmpeg_location: &Path,
        context: &ExtractionContext,
    ) -> Vec<String> {
        let template = output_path.with_extension("%(ext)s");
        let mut args = vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            self.config.audio_format.clone(),
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--ffmpeg-location".to_string(),
            ffmpeg_location.to_string_lossy().to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        args.extend(Self::cookie_args(context));
        args.extend(self.config.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(source.as_str().to_string());
        args
    }

    /// Parses `--dump-json` output into VideoMetadata.
    fn parse_metadata(output: &str) -> Result<VideoMetadata, ExtractorError> {
        #[derive(Deserialize)]
        struct DumpJson {
            title: Option<String>,
            uploader: Option<String>,
            channel: Option<String>,
            duration: Option<f64>,
            webpage_url: Option<String>,
        }

        let line = output
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| ExtractorError::metadata_parse("extractor printed no metadata"))?;

        let info: DumpJson = serde_json::from_str(line)
            .map_err(|e| ExtractorError::metadata_parse(format!("invalid JSON: {}", e)))?;

        let title = info
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ExtractorError::metadata_parse("metadata has no title"))?;

        let uploader = info
            .uploader
            .filter(|u| !u.trim().is_empty())
            .or(info.channel.filter(|c| !c.trim().is_empty()));

        Ok(VideoMetadata {
            title,
            uploader,
            duration_secs: info.duration,
            webpage_url: info.webpage_url,
        })
    }

    fn map_process_error(&self, error: ProcessError, timeout_secs: u64) -> ExtractorError {
        match error {
            ProcessError::NotFound(path) => ExtractorError::ToolUnavailable(
                ProvisionError::tool_unavailable(ToolKind::Extractor, format!("{} not found", path)),
            ),
            ProcessError::Timeout(_) => ExtractorError::Timeout { timeout_secs },
            ProcessError::Cancelled => ExtractorError::Cancelled,
            ProcessError::Io(e) => ExtractorError::Io(e),
        }
    }
}

/// Last non-empty line of a diagnostic dump, for short error reasons.
fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch_metadata(
        &self,
        source: &SourceReference,
        context: &ExtractionContext,
    ) -> Result<VideoMetadata, ExtractorError> {
        let tool = self.tools.ensure_tool(ToolKind::Extractor).await?;
        let args = self.build_metadata_args(source, context);
        debug!("Resolving metadata for {}", source);

        let output = run_tool(
            &tool.binary_path,
            &args,
            Duration::from_secs(self.config.metadata_timeout_secs),
            &context.cancel,
            StdoutMode::Capture,
        )
        .await
        .map_err(|e| self.map_process_error(e, self.config.metadata_timeout_secs))?;

        if !output.success() {
            let reason = last_line(&output.stderr_tail)
                .map(str::to_string)
                .unwrap_or_else(|| format!("exit code {:?}", output.status.code()));
            return Err(ExtractorError::source_unresolvable(reason));
        }

        Self::parse_metadata(&output.stdout)
    }

    async fn extract_audio(
        &self,
        job: ExtractionJob,
        progress_tx: watch::Sender<f32>,
    ) -> Result<ExtractionResult, ExtractorError> {
        let start = Instant::now();
        let extractor = self.tools.ensure_tool(ToolKind::Extractor).await?;
        let muxer = self.tools.ensure_tool(ToolKind::Muxer).await?;

        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_download_args(
            &job.source,
            &job.output_path,
            &muxer.binary_path,
            &job.context,
        );
        info!("Extracting audio from {}", job.source);

        let mut on_line = |line: &str| {
            if let Some(percent) = parse_progress_percent(line) {
                progress_tx.send_replace(percent);
            }
        };

        let output = run_tool(
            &extractor.binary_path,
            &args,
            Duration::from_secs(self.config.download_timeout_secs),
            &job.context.cancel,
            StdoutMode::Lines(&mut on_line),
        )
        .await
        .map_err(|e| self.map_process_error(e, self.config.download_timeout_secs))?;

        if !output.success() {
            warn!(
                "yt-dlp exited with {:?}: {}",
                output.status.code(),
                last_line(&output.stderr_tail).unwrap_or("")
            );
            return Err(ExtractorError::AcquisitionFailed {
                exit_code: output.status.code(),
                stderr: output.stderr_tail,
            });
        }

        let meta = tokio::fs::metadata(&job.output_path).await.map_err(|_| {
            ExtractorError::AcquisitionFailed {
                exit_code: output.status.code(),
                stderr: format!("output file {} was not produced", job.output_path.display()),
            }
        })?;

        Ok(ExtractionResult {
            output_path: job.output_path,
            size_bytes: meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
