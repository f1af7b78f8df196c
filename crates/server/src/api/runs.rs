//! Run API handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use tubetag_core::{
    Artifact, FailureKind, PipelineError, RunHandle, RunLookupError, RunStatus, SourceReference,
    TrackMetadata,
};
use uuid::Uuid;

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a run or previewing a match
#[derive(Debug, Deserialize)]
pub struct SourceBody {
    /// Video link
    pub source: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            kind: None,
        }),
    )
}

fn pipeline_error_response(status: StatusCode, error: PipelineError) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            kind: Some(error.kind),
            error: error.message,
        }),
    )
}

/// Status used when a preview fails with `kind`.
fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::NoMatch | FailureKind::ArtworkUnavailable => StatusCode::NOT_FOUND,
        FailureKind::SourceUnresolvable | FailureKind::MetadataParseError => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FailureKind::CatalogTransportError => StatusCode::BAD_GATEWAY,
        FailureKind::ToolUnavailable | FailureKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::AcquisitionFailed | FailureKind::MuxFailed | FailureKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn lookup_error_response(err: RunLookupError) -> ApiError {
    match err {
        RunLookupError::NotFound(id) => {
            error_response(StatusCode::NOT_FOUND, format!("Run not found: {}", id))
        }
        RunLookupError::NotFinished(id) => error_response(
            StatusCode::CONFLICT,
            format!("Run {} has not finished yet", id),
        ),
        RunLookupError::Failed(error) => pipeline_error_response(StatusCode::GONE, error),
        RunLookupError::Gone(id) => error_response(
            StatusCode::GONE,
            format!("Artifact of run {} is no longer available", id),
        ),
        RunLookupError::Io(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn parse_source(body: &SourceBody) -> Result<SourceReference, ApiError> {
    SourceReference::new(&body.source)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a run
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SourceBody>,
) -> Result<(StatusCode, Json<RunHandle>), ApiError> {
    let source = parse_source(&body)?;
    let handle = state.runner().start(source).await;
    Ok((StatusCode::CREATED, Json(handle)))
}

/// Get the current status of a run
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunStatus>, ApiError> {
    state
        .runner()
        .status(id)
        .await
        .map(Json)
        .map_err(lookup_error_response)
}

/// Cancel a run (DELETE endpoint)
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RunStatus>), ApiError> {
    let runner = state.runner();
    runner.cancel(id).await.map_err(lookup_error_response)?;
    let status = runner.status(id).await.map_err(lookup_error_response)?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// Download the finished file. The run directory is removed afterwards.
pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let artifact = state
        .runner()
        .take_artifact(id)
        .await
        .map_err(lookup_error_response)?;

    info!("Serving {} for run {}", artifact.file_name, id);
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, Artifact::CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// Resolve the catalog match for a link without downloading it
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SourceBody>,
) -> Result<Json<TrackMetadata>, ApiError> {
    let source = parse_source(&body)?;
    match state.runner().preview(&source).await {
        Ok(track) => Ok(Json(track)),
        Err(e) => {
            if !e.kind.is_user_facing() {
                warn!("Preview of {} failed: {}", source, e);
            }
            Err(pipeline_error_response(failure_status(e.kind), e))
        }
    }
}
