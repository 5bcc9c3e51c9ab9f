//! Director HTTP endpoints.
//!
//! - `GET  /status`                  — universal component status (no auth)
//! - `POST /api/queue/task`          — enqueue
//! - `GET  /api/queue`               — stats + task summaries
//! - `GET  /api/queue/:id`           — single entry
//! - `POST /api/queue/:id/cancel`    — cancel (best-effort downstream)
//! - `GET  /api/agents`              — discovery snapshot (agents)
//! - `GET  /api/directors`           — discovery snapshot (directors)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use ag_domain::{config as domain_config, Error};
use ag_protocol::{CancelQueueResponse, EnqueueRequest, ErrorBody};

use crate::auth;
use crate::queue::QueueState;
use crate::state::DirectorState;

pub fn router(state: DirectorState) -> Router {
    let api = Router::new()
        .route("/queue/task", post(enqueue_task))
        .route("/queue", get(queue_stats))
        .route("/queue/:id", get(get_entry))
        .route("/queue/:id/cancel", post(cancel_entry))
        .route("/agents", get(list_agents))
        .route("/directors", get(list_directors))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_password,
        ));

    Router::new()
        .route("/status", get(status))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a domain error onto its wire envelope.
pub fn error_response(err: &Error) -> Response {
    let status = StatusCode::from_u16(err.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from(err))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn status(State(state): State<DirectorState>) -> impl IntoResponse {
    Json(state.status())
}

async fn enqueue_task(
    State(state): State<DirectorState>,
    Json(body): Json<EnqueueRequest>,
) -> Response {
    match state.queue.submit(body) {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn queue_stats(State(state): State<DirectorState>) -> impl IntoResponse {
    Json(state.queue.stats())
}

async fn get_entry(
    State(state): State<DirectorState>,
    Path(queue_id): Path<String>,
) -> Response {
    match state.queue.get(&queue_id) {
        Some(view) => Json(view).into_response(),
        None => error_response(&Error::NotFound(format!("queue entry {queue_id}"))),
    }
}

async fn cancel_entry(
    State(state): State<DirectorState>,
    Path(queue_id): Path<String>,
) -> Response {
    let before = match state.queue.cancel(&queue_id) {
        Ok(before) => before,
        Err(e) => return error_response(&e),
    };
    let was_dispatched = before.state == QueueState::Dispatched;

    // Best-effort downstream cancel; the local record is already terminal
    // and a late completion report will not resurrect it.
    if let (true, Some(agent_url), Some(task_id)) = (
        was_dispatched,
        before.dispatched_to.clone(),
        before.dispatched_task_id.clone(),
    ) {
        let client = state.client.clone();
        tokio::spawn(async move {
            let result = client
                .delete(format!("{agent_url}/task/{task_id}"))
                .timeout(domain_config::STATUS_TIMEOUT)
                .send()
                .await;
            if let Err(e) = result {
                tracing::warn!(
                    agent = %agent_url,
                    task_id = %task_id,
                    error = %e,
                    "downstream cancel failed"
                );
            }
        });
    }

    Json(CancelQueueResponse {
        queue_id,
        was_dispatched,
    })
    .into_response()
}

async fn list_agents(State(state): State<DirectorState>) -> impl IntoResponse {
    Json(state.discovery.agents())
}

async fn list_directors(State(state): State<DirectorState>) -> impl IntoResponse {
    Json(state.discovery.directors())
}
