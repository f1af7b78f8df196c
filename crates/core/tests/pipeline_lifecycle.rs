//! Pipeline lifecycle integration tests.
//!
//! These tests drive whole runs through the pipeline runner with mock
//! components:
//! - Successful run producing "<title>.mp3" with tags
//! - Every failure path ends in one terminal event and an empty run dir
//! - Concurrent runs are isolated from each other
//! - Cancellation tears down the acquisition and cleans up
//! - Acquisition progress never decreases and ends on the latest value
//! - A failed artifact read leaves the run collectable

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tempfile::TempDir;
use uuid::Uuid;

use tubetag_core::{
    catalog::CatalogError,
    extractor::ExtractorError,
    muxer::MuxerError,
    testing::{fixtures, MockMuxer, MockPipeline},
    FailureKind, PipelineRunner, ProgressEvent, RunLookupError, RunOutcome, RunStage,
};

/// Test helper owning the mocks, the runner and its work dir.
struct TestHarness {
    mocks: MockPipeline,
    runner: Arc<PipelineRunner>,
    work_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let mocks = MockPipeline::new();
        let runner = mocks.runner(fixtures::pipeline_config(work_dir.path()));
        Self {
            mocks,
            runner,
            work_dir,
        }
    }

    fn with_max_concurrent(max: usize) -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let mocks = MockPipeline::new();
        let mut config = fixtures::pipeline_config(work_dir.path());
        config.max_concurrent_runs = max;
        let runner = mocks.runner(config);
        Self {
            mocks,
            runner,
            work_dir,
        }
    }

    fn run_dir(&self, run_id: Uuid) -> std::path::PathBuf {
        self.work_dir.path().join(run_id.to_string())
    }

    /// Starts a run and collects its full event stream.
    async fn run_to_end(&self, url: &str) -> (Uuid, Vec<ProgressEvent>) {
        let handle = self.runner.start(fixtures::source(url)).await;
        let events = self.collect(handle.run_id).await;
        (handle.run_id, events)
    }

    async fn collect(&self, run_id: Uuid) -> Vec<ProgressEvent> {
        let stream = self.runner.subscribe(run_id).await.expect("run exists");
        tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
            .await
            .expect("run did not finish in time")
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn terminal_error(events: &[ProgressEvent]) -> (RunStage, FailureKind) {
    match events.last() {
        Some(ProgressEvent::Error { stage, kind, .. }) => (*stage, *kind),
        other => panic!("expected terminal error, got {:?}", other),
    }
}

// =============================================================================
// Success path
// =============================================================================

#[tokio::test]
async fn test_successful_run_produces_tagged_artifact() {
    let harness = TestHarness::new();
    let (run_id, events) = harness.run_to_end("https://youtu.be/abc").await;

    let stages: Vec<RunStage> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Stage { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            RunStage::ResolvingMetadata,
            RunStage::MatchingCatalog,
            RunStage::AcquiringAudio,
            RunStage::FetchingArtwork,
            RunStage::Muxing,
        ]
    );
    assert!(
        matches!(events.last(), Some(ProgressEvent::Done { file_name, .. }) if file_name == "Song Title.mp3")
    );

    // Only the artifact is left before delivery.
    assert_eq!(files_in(&harness.run_dir(run_id)), vec!["Song Title.mp3"]);

    let artifact = harness.runner.take_artifact(run_id).await.unwrap();
    assert_eq!(artifact.file_name, "Song Title.mp3");
    let contents = String::from_utf8_lossy(&artifact.bytes);
    assert!(contents.starts_with("TAGS title=Song Title artist=Artist album=Album"));

    // Delivery removes the run dir; a second take is refused.
    assert!(!harness.run_dir(run_id).exists());
    assert!(matches!(
        harness.runner.take_artifact(run_id).await,
        Err(RunLookupError::Gone(_))
    ));
    let status = harness.runner.status(run_id).await.unwrap();
    assert_eq!(status.outcome, RunOutcome::Delivered);
}

#[tokio::test]
async fn test_failed_read_keeps_artifact_collectable() {
    let harness = TestHarness::new();
    let (run_id, _) = harness.run_to_end("https://youtu.be/abc").await;

    let artifact_path = harness.run_dir(run_id).join("Song Title.mp3");
    let original = std::fs::read(&artifact_path).unwrap();
    std::fs::remove_file(&artifact_path).unwrap();

    assert!(matches!(
        harness.runner.take_artifact(run_id).await,
        Err(RunLookupError::Io(_))
    ));
    let status = harness.runner.status(run_id).await.unwrap();
    assert_eq!(status.outcome, RunOutcome::Succeeded);
    assert!(harness.run_dir(run_id).exists());

    std::fs::write(&artifact_path, &original).unwrap();
    let artifact = harness.runner.take_artifact(run_id).await.unwrap();
    assert_eq!(artifact.bytes, original);
    assert!(!harness.run_dir(run_id).exists());
}

#[tokio::test]
async fn test_query_is_title_and_uploader() {
    let harness = TestHarness::new();
    harness
        .mocks
        .extractor
        .set_metadata(fixtures::video_metadata("Never Gonna", Some("RickAstleyVEVO")))
        .await;

    harness.run_to_end("https://youtu.be/dQw4w9WgXcQ").await;

    let queries = harness.mocks.catalog.recorded_queries().await;
    assert_eq!(queries, vec!["Never Gonna RickAstleyVEVO".to_string()]);
}

#[tokio::test]
async fn test_all_artists_are_tagged_and_title_is_sanitized() {
    let harness = TestHarness::new();
    harness
        .mocks
        .catalog
        .set_track(fixtures::track_metadata("Hello/World: Live!", &["A", "B"]))
        .await;

    let (run_id, events) = harness.run_to_end("https://youtu.be/x").await;
    assert!(
        matches!(events.last(), Some(ProgressEvent::Done { file_name, .. }) if file_name == "HelloWorld Live.mp3")
    );

    let jobs = harness.mocks.muxer.recorded_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].tags.artist, "A, B");
    assert_eq!(jobs[0].tags.title, "Hello/World: Live!");
    assert_eq!(
        MockMuxer::header_for(&jobs[0]),
        "TAGS title=Hello/World: Live! artist=A, B album=Album\n"
    );

    let artifact = harness.runner.take_artifact(run_id).await.unwrap();
    assert_eq!(artifact.file_name, "HelloWorld Live.mp3");
}

#[tokio::test]
async fn test_cookies_are_private_to_each_run() {
    let harness = TestHarness::new();
    harness
        .mocks
        .credentials
        .replace(fixtures::session_cookies())
        .await;

    let (first, _) = harness.run_to_end("https://youtu.be/1").await;
    let (second, _) = harness.run_to_end("https://youtu.be/2").await;

    let extractions = harness.mocks.extractor.recorded_extractions().await;
    assert_eq!(extractions.len(), 2);
    let cookies: Vec<_> = extractions
        .iter()
        .map(|e| e.cookies_path.clone().expect("cookies passed"))
        .collect();
    assert!(cookies[0].starts_with(harness.run_dir(first)));
    assert!(cookies[1].starts_with(harness.run_dir(second)));
}

// =============================================================================
// Failure paths
// =============================================================================

#[tokio::test]
async fn test_no_match_yields_no_artifact() {
    let harness = TestHarness::new();
    harness.mocks.catalog.set_no_match().await;

    let (run_id, events) = harness.run_to_end("https://youtu.be/zzz").await;

    let (stage, kind) = terminal_error(&events);
    assert_eq!(stage, RunStage::MatchingCatalog);
    assert_eq!(kind, FailureKind::NoMatch);
    assert!(kind.is_user_facing());

    assert!(harness.mocks.extractor.recorded_extractions().await.is_empty());
    assert!(!harness.run_dir(run_id).exists());
    assert!(matches!(
        harness.runner.take_artifact(run_id).await,
        Err(RunLookupError::Failed(e)) if e.kind == FailureKind::NoMatch
    ));
}

#[tokio::test]
async fn test_unresolvable_source() {
    let harness = TestHarness::new();
    harness
        .mocks
        .extractor
        .set_next_metadata_error(ExtractorError::source_unresolvable("ERROR: Unsupported URL"))
        .await;

    let (run_id, events) = harness.run_to_end("not-a-video").await;

    assert_eq!(
        terminal_error(&events),
        (RunStage::ResolvingMetadata, FailureKind::SourceUnresolvable)
    );
    assert!(harness.mocks.catalog.recorded_queries().await.is_empty());
    assert!(!harness.run_dir(run_id).exists());
}

#[tokio::test]
async fn test_acquisition_failure_cleans_partial_files() {
    let harness = TestHarness::new();
    harness
        .mocks
        .extractor
        .set_next_extract_error(ExtractorError::AcquisitionFailed {
            exit_code: Some(1),
            stderr: "ERROR: HTTP Error 403: Forbidden".to_string(),
        })
        .await;

    let (run_id, events) = harness.run_to_end("https://youtu.be/abc").await;

    assert_eq!(
        terminal_error(&events),
        (RunStage::AcquiringAudio, FailureKind::AcquisitionFailed)
    );
    match events.last() {
        Some(ProgressEvent::Error { message, .. }) => assert!(message.contains("403")),
        _ => unreachable!(),
    }
    assert!(files_in(&harness.run_dir(run_id)).is_empty());
    assert!(!harness.run_dir(run_id).exists());
}

#[tokio::test]
async fn test_artwork_failure_cleans_audio() {
    let harness = TestHarness::new();
    harness.mocks.artwork.set_unavailable(true).await;

    let (run_id, events) = harness.run_to_end("https://youtu.be/abc").await;

    assert_eq!(
        terminal_error(&events),
        (RunStage::FetchingArtwork, FailureKind::ArtworkUnavailable)
    );
    assert!(!harness.run_dir(run_id).exists());
    assert!(harness.mocks.muxer.recorded_jobs().await.is_empty());
}

#[tokio::test]
async fn test_match_without_artwork_fails_before_download() {
    let harness = TestHarness::new();
    harness
        .mocks
        .catalog
        .set_next_error(CatalogError::NoArtwork {
            title: "Song Title".to_string(),
        })
        .await;

    let (run_id, events) = harness.run_to_end("https://youtu.be/abc").await;

    assert_eq!(
        terminal_error(&events),
        (RunStage::MatchingCatalog, FailureKind::ArtworkUnavailable)
    );
    assert!(harness.mocks.extractor.recorded_extractions().await.is_empty());
    assert!(!harness.run_dir(run_id).exists());
}

#[tokio::test]
async fn test_mux_failure_cleans_everything() {
    let harness = TestHarness::new();
    harness
        .mocks
        .muxer
        .set_next_error(MuxerError::mux_failed(
            "ffmpeg exited with code Some(1)",
            Some("Invalid data found when processing input".to_string()),
        ))
        .await;

    let (run_id, events) = harness.run_to_end("https://youtu.be/abc").await;

    assert_eq!(
        terminal_error(&events),
        (RunStage::Muxing, FailureKind::MuxFailed)
    );
    assert!(!harness.run_dir(run_id).exists());
}

#[tokio::test]
async fn test_catalog_transport_error_is_not_no_match() {
    let harness = TestHarness::new();
    harness
        .mocks
        .catalog
        .set_next_error(CatalogError::Api {
            status: 503,
            message: "Service Unavailable".to_string(),
        })
        .await;

    let (_, events) = harness.run_to_end("https://youtu.be/abc").await;

    let (_, kind) = terminal_error(&events);
    assert_eq!(kind, FailureKind::CatalogTransportError);
    assert!(!kind.is_user_facing());
}

#[tokio::test]
async fn test_exactly_one_terminal_event_per_run() {
    let harness = TestHarness::new();
    harness.mocks.catalog.set_no_match().await;
    let (_, failed) = harness.run_to_end("https://youtu.be/a").await;

    let harness = TestHarness::new();
    let (_, succeeded) = harness.run_to_end("https://youtu.be/b").await;

    for events in [failed, succeeded] {
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }
}

// =============================================================================
// Concurrency, cancellation, progress
// =============================================================================

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let harness = TestHarness::new();

    let mut handles = Vec::new();
    for i in 0..10 {
        handles.push(
            harness
                .runner
                .start(fixtures::source(&format!("https://youtu.be/{}", i)))
                .await,
        );
    }

    for handle in &handles {
        let events = harness.collect(handle.run_id).await;
        assert!(events.iter().all(|e| e.run_id() == handle.run_id));
        assert!(matches!(events.last(), Some(ProgressEvent::Done { .. })));
    }

    let extractions = harness.mocks.extractor.recorded_extractions().await;
    assert_eq!(extractions.len(), 10);
    let mut dirs: Vec<_> = extractions
        .iter()
        .map(|e| e.output_path.parent().unwrap().to_path_buf())
        .collect();
    dirs.sort();
    dirs.dedup();
    assert_eq!(dirs.len(), 10);

    for handle in &handles {
        let artifact = harness.runner.take_artifact(handle.run_id).await.unwrap();
        assert_eq!(artifact.file_name, "Song Title.mp3");
    }
    assert!(files_in(harness.work_dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_during_acquisition_kills_and_cleans_up() {
    let harness = TestHarness::new();
    harness.mocks.extractor.set_hang(true);

    let handle = harness.runner.start(fixtures::source("https://youtu.be/long")).await;
    let mut stream = harness.runner.subscribe(handle.run_id).await.unwrap();

    // Wait until acquisition is underway.
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, ProgressEvent::Progress { .. }) {
            break;
        }
    }
    assert_eq!(harness.mocks.extractor.active_extractions(), 1);

    harness.runner.cancel(handle.run_id).await.unwrap();

    let rest: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .unwrap();
    assert!(matches!(
        rest.last(),
        Some(ProgressEvent::Error {
            kind: FailureKind::Cancelled,
            stage: RunStage::AcquiringAudio,
            ..
        })
    ));
    assert_eq!(harness.mocks.extractor.active_extractions(), 0);
    assert_eq!(harness.mocks.extractor.killed_extractions(), 1);
    assert!(!harness.run_dir(handle.run_id).exists());
}

#[tokio::test]
async fn test_cancel_while_waiting_for_slot() {
    let harness = TestHarness::with_max_concurrent(1);
    harness.mocks.extractor.set_hang(true);

    let first = harness.runner.start(fixtures::source("https://youtu.be/1")).await;
    let second = harness.runner.start(fixtures::source("https://youtu.be/2")).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = harness.runner.status(second.run_id).await.unwrap();
    assert_eq!(status.stage, RunStage::Created);

    harness.runner.cancel(second.run_id).await.unwrap();
    let events = harness.collect(second.run_id).await;
    assert_eq!(
        terminal_error(&events),
        (RunStage::Created, FailureKind::Cancelled)
    );

    harness.runner.cancel(first.run_id).await.unwrap();
    harness.collect(first.run_id).await;
    assert!(files_in(harness.work_dir.path()).is_empty());
}

#[tokio::test]
async fn test_progress_is_non_decreasing() {
    let harness = TestHarness::new();
    harness
        .mocks
        .extractor
        .set_progress_steps(vec![5.0, 30.0, 20.0, 30.0, 75.5, 60.0, 100.0])
        .await;

    let (_, events) = harness.run_to_end("https://youtu.be/abc").await;

    let percents: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percents.last().unwrap(), 100.0);
}

#[tokio::test]
async fn test_final_progress_survives_a_burst() {
    let harness = TestHarness::new();
    harness.mocks.extractor.set_step_delay(Duration::ZERO).await;
    harness
        .mocks
        .extractor
        .set_progress_steps((1..=500).map(|i| i as f32 / 5.0).collect())
        .await;

    let (_, events) = harness.run_to_end("https://youtu.be/abc").await;

    let last = events.iter().rev().find_map(|e| match e {
        ProgressEvent::Progress { percent, .. } => Some(*percent),
        _ => None,
    });
    assert_eq!(last, Some(100.0));
}

#[tokio::test]
async fn test_late_subscriber_replays_history() {
    let harness = TestHarness::new();
    let (run_id, live) = harness.run_to_end("https://youtu.be/abc").await;

    // Progress updates collapse in history; everything else replays as sent.
    let not_progress = |events: &[ProgressEvent]| {
        events
            .iter()
            .filter(|e| !matches!(e, ProgressEvent::Progress { .. }))
            .count()
    };
    let replayed = harness.collect(run_id).await;
    assert_eq!(not_progress(&replayed), not_progress(&live));
    assert!(matches!(replayed.last(), Some(ProgressEvent::Done { .. })));
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn test_unknown_run() {
    let harness = TestHarness::new();
    let unknown = Uuid::new_v4();
    assert!(matches!(
        harness.runner.status(unknown).await,
        Err(RunLookupError::NotFound(_))
    ));
    assert!(matches!(
        harness.runner.cancel(unknown).await,
        Err(RunLookupError::NotFound(_))
    ));
    assert!(harness.runner.subscribe(unknown).await.is_err());
}

#[tokio::test]
async fn test_artifact_not_ready_while_running() {
    let harness = TestHarness::new();
    harness.mocks.extractor.set_hang(true);
    let handle = harness.runner.start(fixtures::source("https://youtu.be/x")).await;

    assert!(matches!(
        harness.runner.take_artifact(handle.run_id).await,
        Err(RunLookupError::NotFinished(_))
    ));

    harness.runner.cancel(handle.run_id).await.unwrap();
    harness.collect(handle.run_id).await;
}

#[tokio::test]
async fn test_expired_artifact_is_reaped() {
    let work_dir = TempDir::new().unwrap();
    let mocks = MockPipeline::new();
    let mut config = fixtures::pipeline_config(work_dir.path());
    config.artifact_ttl_secs = 0;
    let runner = mocks.runner(config);

    let handle = runner.start(fixtures::source("https://youtu.be/x")).await;
    let events: Vec<_> = runner.subscribe(handle.run_id).await.unwrap().collect().await;
    assert!(matches!(events.last(), Some(ProgressEvent::Done { .. })));

    assert_eq!(runner.reap_expired().await, 1);
    assert!(!work_dir.path().join(handle.run_id.to_string()).exists());
    // A zero lifetime also forgets the run on the same sweep.
    assert!(matches!(
        runner.take_artifact(handle.run_id).await,
        Err(RunLookupError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_cancels_and_cleans_up() {
    let harness = TestHarness::new();
    harness.mocks.extractor.set_hang(true);
    let handle = harness.runner.start(fixtures::source("https://youtu.be/x")).await;
    let stream = harness.runner.subscribe(handle.run_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.runner.shutdown().await;

    let events: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .unwrap();
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error {
            kind: FailureKind::Cancelled,
            ..
        })
    ));
    assert!(files_in(harness.work_dir.path()).is_empty());
    assert_eq!(harness.runner.active_runs().await, 0);
}

// =============================================================================
// Preview
// =============================================================================

#[tokio::test]
async fn test_preview_returns_match_without_downloading() {
    let harness = TestHarness::new();
    let track = harness
        .runner
        .preview(&fixtures::source("https://youtu.be/abc"))
        .await
        .unwrap();

    assert_eq!(track.title, "Song Title");
    assert_eq!(track.artist_display(), "Artist");
    assert!(harness.mocks.extractor.recorded_extractions().await.is_empty());
    assert!(files_in(harness.work_dir.path()).is_empty());
}

#[tokio::test]
async fn test_preview_no_match() {
    let harness = TestHarness::new();
    harness.mocks.catalog.set_no_match().await;
    let err = harness
        .runner
        .preview(&fixtures::source("https://youtu.be/abc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::NoMatch);
}
