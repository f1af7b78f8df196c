//! FFmpeg-based muxer implementation.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::process::{run_tool, ProcessError, StdoutMode};
use crate::provisioner::{ProvisionError, ToolKind, ToolProvisioner};

use super::config::MuxerConfig;
use super::error::MuxerError;
use super::traits::Muxer;
use super::types::{MuxJob, MuxResult};

/// FFmpeg-based muxer: stream copy of the audio, cover as attached picture,
/// ID3v2.3 tags.
pub struct FfmpegMuxer {
    config: MuxerConfig,
    tools: Arc<ToolProvisioner>,
}

impl FfmpegMuxer {
    pub fn new(config: MuxerConfig, tools: Arc<ToolProvisioner>) -> Self {
        Self { config, tools }
    }

    /// Builds ffmpeg arguments for a mux job.
    fn build_args(&self, job: &MuxJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-i".to_string(),
            path_arg(&job.audio_path),
            "-i".to_string(),
            path_arg(&job.cover_path),
            "-map".to_string(),
            "0:a".to_string(),
            "-map".to_string(),
            "1:v".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-id3v2_version".to_string(),
            "3".to_string(),
            "-disposition:v:0".to_string(),
            "attached_pic".to_string(),
        ];

        args.extend(job.tags.to_ffmpeg_args());

        args.extend([
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ]);

        args.extend(self.config.extra_args.iter().cloned());

        args.push(path_arg(&job.output_path));
        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn mux(&self, job: MuxJob) -> Result<MuxResult, MuxerError> {
        for input in [&job.audio_path, &job.cover_path] {
            if !input.is_file() {
                return Err(MuxerError::InputNotFound {
                    path: input.clone(),
                });
            }
        }

        let tool = self.tools.ensure_tool(ToolKind::Muxer).await?;
        let args = self.build_args(&job);
        debug!("ffmpeg args: {:?}", args);

        let start = Instant::now();
        let output = run_tool(
            &tool.binary_path,
            &args,
            Duration::from_secs(self.config.timeout_secs),
            &job.cancel,
            StdoutMode::Capture,
        )
        .await
        .map_err(|e| match e {
            ProcessError::NotFound(path) => MuxerError::ToolUnavailable(
                ProvisionError::tool_unavailable(ToolKind::Muxer, format!("{} not found", path)),
            ),
            ProcessError::Timeout(_) => MuxerError::Timeout {
                timeout_secs: self.config.timeout_secs,
            },
            ProcessError::Cancelled => MuxerError::Cancelled,
            ProcessError::Io(e) => MuxerError::Io(e),
        })?;

        if !output.success() {
            warn!("ffmpeg exited with {:?}", output.status.code());
            return Err(MuxerError::mux_failed(
                format!("ffmpeg exited with code {:?}", output.status.code()),
                Some(output.stderr_tail),
            ));
        }

        let size_bytes = match tokio::fs::metadata(&job.output_path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                return Err(MuxerError::mux_failed(
                    "ffmpeg produced no output",
                    Some(output.stderr_tail),
                ))
            }
        };

        Ok(MuxResult {
            output_path: job.output_path,
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
