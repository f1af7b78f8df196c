//! WebSocket progress stream of a single run.
//!
//! The socket replays what the run has published so far, follows it live
//! and closes after the terminal event. A client that goes away before
//! then cancels the run when `pipeline.cancel_on_disconnect` is set.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tubetag_core::{ProgressStream, RunLookupError};
use uuid::Uuid;

use super::runs::ErrorResponse;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECT_CANCELS, WS_MESSAGES_SENT,
};
use crate::state::AppState;

/// Normal closure once the run has ended.
const CLOSE_NORMAL: u16 = 1000;

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// The terminal event was delivered.
    RunFinished,
    /// The run's channel ended without a terminal event.
    StreamClosed,
    /// The client closed or dropped the socket first.
    ClientGone,
}

/// WebSocket upgrade handler for `/runs/{id}/events`.
pub async fn run_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Response {
    let events = match state.runner().subscribe(run_id).await {
        Ok(events) => events,
        Err(RunLookupError::NotFound(_)) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Run not found: {}", run_id),
                    kind: None,
                }),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                    kind: None,
                }),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, run_id, events))
}

/// Forward one run's events to a single WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    run_id: Uuid,
    mut events: ProgressStream,
) {
    let (mut sender, mut receiver) = socket.split();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("Progress socket opened for run {}", run_id);

    let ending = loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    break Ending::StreamClosed;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize ProgressEvent: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket send failed, client disconnected");
                    break Ending::ClientGone;
                }
                WS_MESSAGES_SENT.with_label_values(&[event.kind()]).inc();
                if event.is_terminal() {
                    break Ending::RunFinished;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client closed before run {} ended", run_id);
                        break Ending::ClientGone;
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Clients have nothing to say on this socket.
                        debug!("Ignoring text message: {}", text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break Ending::ClientGone;
                    }
                }
            }
        }
    };

    match ending {
        Ending::RunFinished | Ending::StreamClosed => {
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_NORMAL,
                    reason: "run finished".into(),
                })))
                .await;
        }
        Ending::ClientGone => {
            if state.cancel_on_disconnect() {
                match state.runner().cancel(run_id).await {
                    Ok(()) => {
                        WS_DISCONNECT_CANCELS.inc();
                        info!("Run {} cancelled after its watcher disconnected", run_id);
                    }
                    Err(e) => debug!("Cancel after disconnect skipped: {}", e),
                }
            }
        }
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!("Progress socket closed for run {}", run_id);
}
