//! Progress event types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{FailureKind, RunStage};

/// One observable change in a run, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The run entered a new stage.
    Stage {
        run_id: Uuid,
        stage: RunStage,
        message: String,
    },
    /// Acquisition progress in percent, never decreasing within a run.
    Progress {
        run_id: Uuid,
        percent: f32,
        message: String,
    },
    /// The artifact is ready for collection.
    Done {
        run_id: Uuid,
        file_name: String,
        size_bytes: u64,
    },
    /// The run failed or was cancelled.
    Error {
        run_id: Uuid,
        stage: RunStage,
        kind: FailureKind,
        message: String,
    },
}

impl ProgressEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Stage { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::Done { run_id, .. }
            | Self::Error { run_id, .. } => *run_id,
        }
    }

    /// Done and Error end a run's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Short event kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Progress { .. } => "progress",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
