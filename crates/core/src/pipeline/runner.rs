//! Pipeline runner implementation.
//!
//! Drives each run through its stages on its own task:
//! metadata → catalog match → audio → artwork → mux. Every run owns a
//! directory, a progress channel and a cancellation token; whatever way
//! a run ends, its temporary files are removed.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artwork::ArtworkFetcher;
use crate::catalog::{TrackCatalog, TrackMetadata};
use crate::extractor::{ExtractionContext, ExtractionJob, Extractor, SourceReference};
use crate::metrics::{ARTIFACTS_REAPED, RUNS_ACTIVE, RUNS_FINISHED, RUNS_STARTED, STAGE_DURATION};
use crate::muxer::{sanitize_file_stem, EmbeddedTags, MuxJob, Muxer};
use crate::progress::{ProgressChannel, ProgressEvent, ProgressStream};
use crate::provisioner::CredentialStore;

use super::config::PipelineConfig;
use super::failure::{from_artwork, from_catalog, from_extractor, from_muxer};
use super::types::{
    Artifact, ArtifactInfo, FailureKind, PipelineError, RunHandle, RunLookupError, RunOutcome,
    RunStage, RunStatus,
};
use super::workspace::{remove_run_dir, RunWorkspace};

/// How long shutdown waits for in-flight runs to clean up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The components a run calls into.
#[derive(Clone)]
pub struct PipelineDeps {
    pub extractor: Arc<dyn Extractor>,
    pub catalog: Arc<dyn TrackCatalog>,
    pub artwork: Arc<dyn ArtworkFetcher>,
    pub muxer: Arc<dyn Muxer>,
    pub credentials: Arc<CredentialStore>,
}

#[derive(Debug, Clone)]
struct StoredArtifact {
    path: PathBuf,
    file_name: String,
    size_bytes: u64,
}

#[derive(Debug)]
struct RunRecord {
    stage: RunStage,
    outcome: RunOutcome,
    percent: Option<f32>,
    track: Option<TrackMetadata>,
    error: Option<PipelineError>,
    artifact: Option<StoredArtifact>,
    workspace: Option<RunWorkspace>,
    finished_at: Option<DateTime<Utc>>,
}

struct RunEntry {
    run_id: Uuid,
    source: SourceReference,
    created_at: DateTime<Utc>,
    channel: ProgressChannel,
    cancel: CancellationToken,
    record: Mutex<RunRecord>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RunEntry {
    fn record(&self) -> MutexGuard<'_, RunRecord> {
        match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn status(&self) -> RunStatus {
        let record = self.record();
        RunStatus {
            run_id: self.run_id,
            source: self.source.to_string(),
            stage: record.stage,
            outcome: record.outcome,
            percent: record.percent,
            track: record.track.clone(),
            artifact: record.artifact.as_ref().map(|a| ArtifactInfo {
                file_name: a.file_name.clone(),
                size_bytes: a.size_bytes,
            }),
            error: record.error.clone(),
            created_at: self.created_at,
            finished_at: record.finished_at,
        }
    }

    fn publish_stage(&self, stage: RunStage) {
        self.record().stage = stage;
        self.channel.publish(ProgressEvent::Stage {
            run_id: self.run_id,
            stage,
            message: stage.description().to_string(),
        });
    }
}

/// Result of a run that produced its artifact.
struct Completed {
    artifact: StoredArtifact,
}

/// Runs pipelines and keeps track of them until their artifacts are
/// collected or expire.
pub struct PipelineRunner {
    config: PipelineConfig,
    deps: PipelineDeps,
    slots: Arc<Semaphore>,
    runs: RwLock<HashMap<Uuid, Arc<RunEntry>>>,
    shutdown: CancellationToken,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            config,
            deps,
            slots,
            runs: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registers a run and starts it on its own task.
    pub async fn start(self: &Arc<Self>, source: SourceReference) -> RunHandle {
        let run_id = Uuid::new_v4();
        let entry = Arc::new(RunEntry {
            run_id,
            source,
            created_at: Utc::now(),
            channel: ProgressChannel::new(run_id, self.config.progress_capacity),
            cancel: self.shutdown.child_token(),
            record: Mutex::new(RunRecord {
                stage: RunStage::Created,
                outcome: RunOutcome::Running,
                percent: None,
                track: None,
                error: None,
                artifact: None,
                workspace: None,
                finished_at: None,
            }),
            task: Mutex::new(None),
        });

        self.runs.write().await.insert(run_id, entry.clone());
        RUNS_STARTED.inc();
        info!("Run {} created for {}", run_id, entry.source);

        let runner = Arc::clone(self);
        let task_entry = entry.clone();
        let handle = tokio::spawn(async move { runner.execute(task_entry).await });
        if let Ok(mut task) = entry.task.lock() {
            *task = Some(handle);
        }

        RunHandle { run_id }
    }

    /// Event stream of a run: history, then live events until the end.
    pub async fn subscribe(&self, run_id: Uuid) -> Result<ProgressStream, RunLookupError> {
        Ok(self.entry(run_id).await?.channel.subscribe())
    }

    /// Cancels a run. Cancelling a finished run has no effect.
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), RunLookupError> {
        let entry = self.entry(run_id).await?;
        if !entry.channel.is_finished() {
            info!("Cancelling run {}", run_id);
            entry.cancel.cancel();
        }
        Ok(())
    }

    pub async fn status(&self, run_id: Uuid) -> Result<RunStatus, RunLookupError> {
        Ok(self.entry(run_id).await?.status())
    }

    /// Reads the finished artifact and removes the run directory.
    ///
    /// An artifact can be taken once. A failed read leaves the run in
    /// `Succeeded` with its directory intact.
    pub async fn take_artifact(&self, run_id: Uuid) -> Result<Artifact, RunLookupError> {
        let entry = self.entry(run_id).await?;

        let (stored, workspace) = {
            let mut record = entry.record();
            match record.outcome {
                RunOutcome::Running => return Err(RunLookupError::NotFinished(run_id)),
                RunOutcome::Failed => {
                    let error = record.error.clone().unwrap_or_else(|| {
                        PipelineError::new(record.stage, FailureKind::Internal, "run failed")
                    });
                    return Err(RunLookupError::Failed(error));
                }
                RunOutcome::Delivered | RunOutcome::Expired => {
                    return Err(RunLookupError::Gone(run_id))
                }
                RunOutcome::Succeeded => {
                    record.outcome = RunOutcome::Delivered;
                    (record.artifact.take(), record.workspace.take())
                }
            }
        };

        let stored = stored.ok_or(RunLookupError::Gone(run_id))?;
        let bytes = match tokio::fs::read(&stored.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Run {} artifact {} could not be read: {}",
                    run_id,
                    stored.path.display(),
                    e
                );
                // Nothing was delivered; the run stays collectable.
                let mut record = entry.record();
                record.outcome = RunOutcome::Succeeded;
                record.artifact = Some(stored);
                record.workspace = workspace;
                return Err(e.into());
            }
        };

        match &workspace {
            Some(ws) => ws.discard().await,
            None => {
                if let Some(dir) = stored.path.parent() {
                    let _ = remove_run_dir(dir).await;
                }
            }
        }

        info!(
            "Run {} delivered {} ({} bytes)",
            run_id,
            stored.file_name,
            bytes.len()
        );
        Ok(Artifact {
            file_name: stored.file_name,
            bytes,
        })
    }

    /// Resolves the catalog match for a source without downloading.
    pub async fn preview(&self, source: &SourceReference) -> Result<TrackMetadata, PipelineError> {
        let workspace = RunWorkspace::create(&self.config.work_dir, Uuid::new_v4())
            .await
            .map_err(|e| internal(RunStage::Created, e))?;

        let cancel = self.shutdown.child_token();
        let result = async {
            let context = self.extraction_context(&workspace, cancel.clone()).await?;

            let query = cancellable(&cancel, RunStage::ResolvingMetadata, async {
                self.deps
                    .extractor
                    .resolve_query(source, &context)
                    .await
                    .map_err(|e| from_extractor(RunStage::ResolvingMetadata, e))
            })
            .await?;

            cancellable(&cancel, RunStage::MatchingCatalog, async {
                self.deps
                    .catalog
                    .search_best(&query)
                    .await
                    .map_err(|e| from_catalog(RunStage::MatchingCatalog, e))
            })
            .await
        }
        .await;

        workspace.discard().await;
        result
    }

    /// Number of runs that have not finished yet.
    pub async fn active_runs(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|e| !e.channel.is_finished())
            .count()
    }

    /// Expires undelivered artifacts past their lifetime and forgets runs
    /// finished long ago. Returns the number of artifacts removed.
    pub async fn reap_expired(&self) -> usize {
        let ttl = chrono::Duration::seconds(self.config.artifact_ttl_secs as i64);
        let now = Utc::now();
        let mut reaped = 0;
        let mut forget = Vec::new();

        let entries: Vec<Arc<RunEntry>> = self.runs.read().await.values().cloned().collect();
        for entry in entries {
            let (expired_workspace, stale) = {
                let mut record = entry.record();
                let Some(finished_at) = record.finished_at else {
                    continue;
                };
                let age = now - finished_at;
                let expired = if record.outcome == RunOutcome::Succeeded && age >= ttl {
                    record.outcome = RunOutcome::Expired;
                    record.artifact = None;
                    record.workspace.take()
                } else {
                    None
                };
                (expired, age >= ttl * 2)
            };

            if let Some(ws) = expired_workspace {
                ws.discard().await;
                ARTIFACTS_REAPED.inc();
                reaped += 1;
                info!("Run {} artifact expired before collection", entry.run_id);
            }
            if stale {
                forget.push(entry.run_id);
            }
        }

        if !forget.is_empty() {
            let mut runs = self.runs.write().await;
            for run_id in &forget {
                runs.remove(run_id);
            }
            debug!("Forgot {} finished runs", forget.len());
        }
        reaped
    }

    /// Periodically calls [`reap_expired`](Self::reap_expired) until shutdown.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        let period = Duration::from_secs(self.config.reap_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        runner.reap_expired().await;
                    }
                    _ = runner.shutdown.cancelled() => {
                        debug!("Artifact reaper stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Cancels every run, waits for their cleanup and removes undelivered
    /// artifacts.
    pub async fn shutdown(&self) {
        info!("Shutting down pipeline runner");
        self.shutdown.cancel();

        let entries: Vec<Arc<RunEntry>> = self.runs.write().await.drain().map(|(_, e)| e).collect();
        for entry in entries {
            let handle = entry.task.lock().ok().and_then(|mut t| t.take());
            if let Some(handle) = handle {
                if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                    warn!("Run {} did not stop within {:?}", entry.run_id, SHUTDOWN_GRACE);
                }
            }
            let workspace = entry.record().workspace.take();
            if let Some(ws) = workspace {
                ws.discard().await;
            }
        }
    }

    async fn entry(&self, run_id: Uuid) -> Result<Arc<RunEntry>, RunLookupError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(RunLookupError::NotFound(run_id))
    }

    async fn execute(self: Arc<Self>, entry: Arc<RunEntry>) {
        let permit = tokio::select! {
            permit = self.slots.clone().acquire_owned() => permit.ok(),
            _ = entry.cancel.cancelled() => None,
        };

        let result = match permit {
            Some(_permit) => {
                RUNS_ACTIVE.inc();
                let result = self.drive(&entry).await;
                RUNS_ACTIVE.dec();
                result
            }
            None => Err(PipelineError::cancelled(RunStage::Created)),
        };

        self.finish(&entry, result).await;
    }

    async fn drive(&self, entry: &Arc<RunEntry>) -> Result<Completed, PipelineError> {
        let workspace = RunWorkspace::create(&self.config.work_dir, entry.run_id)
            .await
            .map_err(|e| internal(RunStage::Created, e))?;
        entry.record().workspace = Some(workspace.clone());

        let context = self
            .extraction_context(&workspace, entry.cancel.clone())
            .await?;

        // Metadata
        let query = self
            .stage(entry, RunStage::ResolvingMetadata, async {
                self.deps
                    .extractor
                    .resolve_query(&entry.source, &context)
                    .await
                    .map_err(|e| from_extractor(RunStage::ResolvingMetadata, e))
            })
            .await?;
        debug!("Run {} query: {}", entry.run_id, query);

        // Catalog
        let track = self
            .stage(entry, RunStage::MatchingCatalog, async {
                self.deps
                    .catalog
                    .search_best(&query)
                    .await
                    .map_err(|e| from_catalog(RunStage::MatchingCatalog, e))
            })
            .await?;
        info!(
            "Run {} matched '{}' by {}",
            entry.run_id,
            track.title,
            track.artist_display()
        );
        entry.record().track = Some(track.clone());

        // Audio
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let forwarder = tokio::spawn(forward_progress(entry.clone(), progress_rx));
        let job = ExtractionJob {
            source: entry.source.clone(),
            output_path: workspace.audio_path(),
            context: context.clone(),
        };
        let extracted = self
            .stage(entry, RunStage::AcquiringAudio, async {
                self.deps
                    .extractor
                    .extract_audio(job, progress_tx)
                    .await
                    .map_err(|e| from_extractor(RunStage::AcquiringAudio, e))
            })
            .await;
        // The sender is gone once extraction returns; the forwarder ends
        // after publishing the final value.
        let _ = forwarder.await;
        let extracted = extracted?;
        debug!(
            "Run {} extracted {} bytes in {}ms",
            entry.run_id, extracted.size_bytes, extracted.duration_ms
        );

        // Artwork
        let cover_path = workspace.cover_path();
        let artwork_budget = Duration::from_secs(self.config.artwork_timeout_secs);
        self.stage(entry, RunStage::FetchingArtwork, async {
            match tokio::time::timeout(
                artwork_budget,
                self.deps.artwork.fetch(&track.artwork_url, &cover_path),
            )
            .await
            {
                Ok(result) => result.map_err(|e| from_artwork(RunStage::FetchingArtwork, e)),
                Err(_) => Err(PipelineError::new(
                    RunStage::FetchingArtwork,
                    FailureKind::Timeout,
                    format!("Artwork download timed out after {:?}", artwork_budget),
                )),
            }
        })
        .await?;

        // Mux
        let stem = sanitize_file_stem(&track.title);
        let output_path = workspace.output_path(&stem);
        let mux_job = MuxJob {
            audio_path: extracted.output_path,
            cover_path,
            output_path: output_path.clone(),
            tags: EmbeddedTags::from(&track),
            cancel: entry.cancel.clone(),
        };
        let muxed = self
            .stage(entry, RunStage::Muxing, async {
                self.deps
                    .muxer
                    .mux(mux_job)
                    .await
                    .map_err(|e| from_muxer(RunStage::Muxing, e))
            })
            .await?;

        workspace
            .remove_intermediates(&output_path)
            .await
            .map_err(|e| internal(RunStage::Muxing, e))?;

        Ok(Completed {
            artifact: StoredArtifact {
                path: muxed.output_path,
                file_name: format!("{}.mp3", stem),
                size_bytes: muxed.size_bytes,
            },
        })
    }

    /// Enters `stage`, then runs `work` unless the run is cancelled first.
    async fn stage<T, F>(
        &self,
        entry: &RunEntry,
        stage: RunStage,
        work: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        entry.publish_stage(stage);
        let start = Instant::now();
        let result = cancellable(&entry.cancel, stage, work).await;
        STAGE_DURATION
            .with_label_values(&[stage.as_str()])
            .observe(start.elapsed().as_secs_f64());
        result
    }

    async fn extraction_context(
        &self,
        workspace: &RunWorkspace,
        cancel: CancellationToken,
    ) -> Result<ExtractionContext, PipelineError> {
        let cookies_path = match self.deps.credentials.current().await {
            Some(cookies) => Some(
                workspace
                    .install_cookies(&cookies)
                    .await
                    .map_err(|e| internal(RunStage::Created, e))?,
            ),
            None => None,
        };
        Ok(ExtractionContext {
            cookies_path,
            cancel,
        })
    }

    async fn finish(&self, entry: &RunEntry, result: Result<Completed, PipelineError>) {
        let now = Utc::now();
        match result {
            Ok(completed) => {
                let artifact = completed.artifact;
                {
                    let mut record = entry.record();
                    record.stage = RunStage::Finished;
                    record.outcome = RunOutcome::Succeeded;
                    record.finished_at = Some(now);
                    record.artifact = Some(artifact.clone());
                }
                RUNS_FINISHED.with_label_values(&["success"]).inc();
                info!("Run {} finished: {}", entry.run_id, artifact.file_name);
                entry.channel.publish(ProgressEvent::Done {
                    run_id: entry.run_id,
                    file_name: artifact.file_name,
                    size_bytes: artifact.size_bytes,
                });
            }
            Err(error) => {
                let error = if entry.cancel.is_cancelled() && error.kind != FailureKind::Cancelled {
                    PipelineError::cancelled(error.stage)
                } else {
                    error
                };

                let workspace = entry.record().workspace.take();
                if let Some(ws) = workspace {
                    ws.discard().await;
                }

                {
                    let mut record = entry.record();
                    record.stage = RunStage::Finished;
                    record.outcome = RunOutcome::Failed;
                    record.finished_at = Some(now);
                    record.error = Some(error.clone());
                }

                RUNS_FINISHED
                    .with_label_values(&[error.kind.as_str()])
                    .inc();
                match error.kind {
                    FailureKind::Cancelled => info!("Run {} cancelled", entry.run_id),
                    kind if kind.is_user_facing() => info!("Run {} ended: {}", entry.run_id, error),
                    FailureKind::Internal => error!("Run {} failed: {}", entry.run_id, error),
                    _ => warn!("Run {} failed: {}", entry.run_id, error),
                }

                entry.channel.publish(ProgressEvent::Error {
                    run_id: entry.run_id,
                    stage: error.stage,
                    kind: error.kind,
                    message: error.message,
                });
            }
        }
    }
}

/// Publishes the latest extractor percentage as a non-decreasing sequence.
///
/// Values replaced before they are observed are skipped; the final value
/// is still seen after the sender is dropped.
async fn forward_progress(entry: Arc<RunEntry>, mut rx: watch::Receiver<f32>) {
    let mut last: Option<f32> = None;
    while rx.changed().await.is_ok() {
        let percent = *rx.borrow_and_update();
        let percent = percent.clamp(0.0, 100.0);
        if last.is_some_and(|l| percent <= l) {
            continue;
        }
        last = Some(percent);
        entry.record().percent = Some(percent);
        entry.channel.publish(ProgressEvent::Progress {
            run_id: entry.run_id,
            percent,
            message: RunStage::AcquiringAudio.description().to_string(),
        });
    }
}

/// Runs `work` unless `cancel` fires first; dropping `work` kills any
/// process it spawned.
async fn cancellable<T, F>(
    cancel: &CancellationToken,
    stage: RunStage,
    work: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::cancelled(stage)),
        result = work => result,
    }
}

fn internal(stage: RunStage, error: std::io::Error) -> PipelineError {
    PipelineError::new(stage, FailureKind::Internal, error.to_string())
}
