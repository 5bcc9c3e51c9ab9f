//! Scheduler runtime: shared state, the minute ticker, and config reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::{Timelike, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use ag_domain::{ComponentState, Error, Result, Role};
use ag_protocol::StatusResponse;

use crate::config::SchedulerConfig;
use crate::dispatch;
use crate::jobs::JobSet;

#[derive(Clone)]
pub struct SchedulerState {
    pub config_path: Arc<PathBuf>,
    pub jobs: Arc<Mutex<JobSet>>,
    pub client: reqwest::Client,
    pub port: u16,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl SchedulerState {
    pub fn new(config_path: PathBuf, port: u16) -> Result<Self> {
        // Startup parse failure is fatal; reload failures are not.
        let config = SchedulerConfig::load(&config_path)?;
        let mut jobs = JobSet::new();
        jobs.apply_config(&config, Utc::now());
        tracing::info!(jobs = jobs.len(), "job set loaded");

        let client = reqwest::Client::builder()
            .timeout(ag_domain::config::SUBMIT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("building http client: {e}")))?;

        Ok(Self {
            config_path: Arc::new(config_path),
            jobs: Arc::new(Mutex::new(jobs)),
            client,
            port,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn status(&self) -> StatusResponse {
        let jobs = self.jobs.lock();
        StatusResponse {
            roles: vec![Role::Scheduler],
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: if self.shutdown.is_cancelled() {
                ComponentState::Stopping
            } else {
                ComponentState::Idle
            },
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            agent_kind: None,
            tier: None,
            current_task: None,
            config: serde_json::json!({
                "port": self.port,
                "config_path": self.config_path.display().to_string(),
                "jobs": jobs.summaries(),
            }),
        }
    }
}

pub fn router(state: SchedulerState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:name", get(get_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<SchedulerState>) -> impl IntoResponse {
    Json(state.status())
}

async fn list_jobs(State(state): State<SchedulerState>) -> impl IntoResponse {
    Json(state.jobs.lock().summaries())
}

async fn get_job(
    State(state): State<SchedulerState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> axum::response::Response {
    let summary = state
        .jobs
        .lock()
        .summaries()
        .into_iter()
        .find(|j| j.name == name);
    match summary {
        Some(summary) => Json(summary).into_response(),
        None => {
            let err = Error::JobNotFound(name);
            (
                axum::http::StatusCode::NOT_FOUND,
                Json(ag_protocol::ErrorBody::from(&err)),
            )
                .into_response()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Minute ticker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wake at each minute boundary and fire every due job once.
pub async fn tick_loop(state: SchedulerState) {
    tracing::info!("scheduler tick loop started");
    loop {
        let wait = until_next_minute();
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let now = Utc::now();
        let due = state.jobs.lock().due(now);
        for job in due {
            // Stamp before the (async) submit so the same minute can never
            // fire the job twice.
            state.jobs.lock().record_fired(&job.name, now);
            tracing::info!(job = %job.name, target = %job.target, "job due, dispatching");

            let client = state.client.clone();
            let jobs = state.jobs.clone();
            tokio::spawn(async move {
                let outcome = dispatch::fire(&client, &job).await;
                jobs.lock().record_outcome(&job.name, outcome.err());
            });
        }
    }
    tracing::info!("scheduler tick loop stopped");
}

/// Duration until just past the next wall-clock minute boundary.
fn until_next_minute() -> Duration {
    let now = Utc::now();
    let into_minute = now.second() as u64;
    // A hair past the boundary so truncated comparisons land cleanly.
    Duration::from_secs(60 - into_minute.min(59)) + Duration::from_millis(50)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config reload
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reload the YAML on an interval. A broken file keeps the previous set.
pub async fn reload_loop(state: SchedulerState, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "config reload loop started");
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // The first tick is immediate; startup already loaded.
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match SchedulerConfig::load(&state.config_path) {
            Ok(config) => {
                let mut jobs = state.jobs.lock();
                jobs.apply_config(&config, Utc::now());
                tracing::debug!(jobs = jobs.len(), "config reloaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "config reload failed, keeping previous jobs");
            }
        }
    }
}
