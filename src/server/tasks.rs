use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tabpilot_core_types::OriginId;
use tabpilot_orchestrator::{OrchestratorError, StatusSnapshot, StopOutcome};
use tabpilot_registry::RegistryError;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use super::ServerState;

type ApiError = (StatusCode, Json<Value>);

pub(super) fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/tasks", post(start_task_handler))
        .route("/api/tasks/:origin", get(task_status_handler))
        .route("/api/tasks/:origin/stop", post(stop_task_handler))
        .route("/api/tasks/:origin/events", get(task_events_handler))
}

#[derive(Debug, Deserialize)]
struct StartTaskRequest {
    goal: String,
    origin: String,
}

#[instrument(skip(state))]
async fn start_task_handler(
    State(state): State<ServerState>,
    Json(payload): Json<StartTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let origin = payload.origin.trim();
    if origin.is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "origin is required"));
    }
    let origin = OriginId::new(origin);
    match state.orchestrator().start_task(&payload.goal, &origin).await {
        Ok(receipt) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "task": receipt,
            })),
        )),
        Err(err) => {
            warn!(origin = %origin, error = %err, "task not started");
            Err(start_error(&err))
        }
    }
}

#[instrument(skip(state))]
async fn stop_task_handler(
    State(state): State<ServerState>,
    Path(origin): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let origin = OriginId::new(origin);
    let outcome = state
        .orchestrator()
        .stop_task(&origin)
        .map_err(|err| error_body(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))?;
    if outcome == StopOutcome::NotFound {
        return Err(not_found(&origin));
    }
    Ok(Json(json!({
        "success": true,
        "result": outcome,
    })))
}

#[instrument(skip(state))]
async fn task_status_handler(
    State(state): State<ServerState>,
    Path(origin): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let origin = OriginId::new(origin);
    match state.orchestrator().get_status(&origin) {
        StatusSnapshot::Found(status) => Ok(Json(json!({
            "success": true,
            "session": status,
        }))),
        StatusSnapshot::NotFound => Err(not_found(&origin)),
    }
}

/// Live events for one origin, opened with the current status snapshot
#[instrument(skip(state))]
async fn task_events_handler(
    State(state): State<ServerState>,
    Path(origin): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let origin = OriginId::new(origin);
    let orchestrator = state.orchestrator();
    let StatusSnapshot::Found(snapshot) = orchestrator.get_status(&origin) else {
        return Err(not_found(&origin));
    };
    let mut receiver = orchestrator.subscribe(&origin);

    let stream = stream! {
        match Event::default().event("status").json_data(&snapshot) {
            Ok(event) => {
                yield Ok::<Event, Infallible>(event);
            }
            Err(err) => warn!(?err, "status snapshot not serializable"),
        }
        loop {
            match receiver.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(serialized) => {
                        yield Ok(serialized);
                    }
                    Err(err) => warn!(?err, "task event not serializable"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn start_error(err: &OrchestratorError) -> ApiError {
    let status = match err {
        OrchestratorError::EmptyGoal => StatusCode::BAD_REQUEST,
        OrchestratorError::Registry(RegistryError::Conflict(_)) => StatusCode::CONFLICT,
        OrchestratorError::Context { .. } => StatusCode::BAD_GATEWAY,
        OrchestratorError::Registry(_) | OrchestratorError::Planning(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(json!({
            "success": false,
            "error": err.to_string(),
            "kind": err.kind().as_str(),
        })),
    )
}

fn not_found(origin: &OriginId) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "state": "not_found",
            "error": format!("no session for origin {origin}"),
        })),
    )
}

fn error_body(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(json!({
            "success": false,
            "error": message,
        })),
    )
}
