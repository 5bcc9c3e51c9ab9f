//! Agent HTTP endpoints.
//!
//! - `GET    /status`             — universal component status
//! - `POST   /task`               — accept a task (`409 agent_busy` while working)
//! - `GET    /task/:id`           — task status (live record, then history)
//! - `DELETE /task/:id`           — cancel the running/queued task
//! - `GET    /history`            — paginated outline listing
//! - `GET    /history/:id`        — full outline entry
//! - `GET    /history/:id/debug`  — raw stream log bytes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use ag_domain::Error;
use ag_history::ListOptions;
use ag_protocol::{CancelTaskResponse, ErrorBody, SubmitTaskRequest, SubmitTaskResponse};

use crate::state::AgentState;
use crate::supervisor;

pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/task", axum::routing::post(submit_task))
        .route("/task/:id", get(task_status).delete(cancel_task))
        .route("/history", get(list_history))
        .route("/history/:id", get(get_history))
        .route("/history/:id/debug", get(get_debug_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a domain error onto its wire envelope.
fn error_response(err: &Error) -> Response {
    let status = StatusCode::from_u16(err.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from(err))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn status(State(state): State<AgentState>) -> impl IntoResponse {
    Json(state.status())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn submit_task(
    State(state): State<AgentState>,
    Json(body): Json<SubmitTaskRequest>,
) -> Response {
    match state.accept_task(body) {
        Ok((record, token)) => {
            let response = SubmitTaskResponse {
                task_id: record.task_id.clone(),
                session_id: record.session_id.clone(),
            };
            tokio::spawn(supervisor::run_task(state.clone(), token));
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET / DELETE /task/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn task_status(
    State(state): State<AgentState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.task_status(&task_id) {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => error_response(&Error::NotFound(format!("task {task_id}"))),
        Err(e) => error_response(&e),
    }
}

async fn cancel_task(
    State(state): State<AgentState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.cancel_task(&task_id) {
        Ok(()) => Json(CancelTaskResponse { cancelled: true }).into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    page: usize,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_history(
    State(state): State<AgentState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let page = state.history.list(&ListOptions {
        page: query.page,
        limit: query.limit,
    });
    Json(page)
}

async fn get_history(
    State(state): State<AgentState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.history.get(&task_id) {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => error_response(&Error::NotFound(format!("task {task_id}"))),
        Err(e) => error_response(&e),
    }
}

async fn get_debug_log(
    State(state): State<AgentState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.history.get_debug_log(&task_id) {
        Ok(Some(bytes)) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Ok(None) => error_response(&Error::NotFound(format!("debug log for {task_id}"))),
        Err(e) => error_response(&e),
    }
}
