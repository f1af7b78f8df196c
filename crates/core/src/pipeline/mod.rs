//! Download orchestration pipeline.
//!
//! A run takes a video link through these stages:
//!
//! ```text
//! Created → ResolvingMetadata → MatchingCatalog → AcquiringAudio
//!         → FetchingArtwork → Muxing → Finished
//! ```
//!
//! Any failure jumps straight to `Finished` with a [`PipelineError`]. Runs
//! are not resumable; a new request starts a new run.

mod config;
mod failure;
mod runner;
mod types;
mod workspace;

pub use config::PipelineConfig;
pub use runner::{PipelineDeps, PipelineRunner};
pub use types::{
    Artifact, ArtifactInfo, FailureKind, PipelineError, RunHandle, RunLookupError, RunOutcome,
    RunStage, RunStatus,
};
pub use workspace::RunWorkspace;
