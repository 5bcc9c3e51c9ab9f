//! Thin HTTP client over the fleet protocol.
//!
//! Failures come back as the shared [`Error`] type so `main` can print a
//! uniform `[<code>] <message>` line.

use std::time::Duration;

use ag_domain::{config as domain_config, Error, Result};
use ag_protocol::{
    CancelQueueResponse, EnqueueRequest, EnqueueResponse, ErrorBody, QueueStatsResponse,
    StatusResponse, SubmitTaskRequest, SubmitTaskResponse, TaskStatusResponse,
};

pub struct FleetClient {
    http: reqwest::Client,
    /// Bearer password for director `/api` calls, if configured.
    password: Option<String>,
}

impl FleetClient {
    pub fn new(password: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(domain_config::SUBMIT_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Internal(format!("building http client: {e}")))?;
        Ok(Self { http, password })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.password {
            Some(password) => builder.bearer_auth(password),
            None => builder,
        }
    }

    // ── Component status ────────────────────────────────────────────

    pub async fn status(&self, base_url: &str) -> Result<StatusResponse> {
        let response = self
            .http
            .get(format!("{base_url}/status"))
            .timeout(domain_config::STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable_error(base_url, e))?;
        decode(base_url, response).await
    }

    // ── Agent task endpoints ────────────────────────────────────────

    pub async fn submit_task(
        &self,
        agent_url: &str,
        request: &SubmitTaskRequest,
    ) -> Result<SubmitTaskResponse> {
        let response = self
            .http
            .post(format!("{agent_url}/task"))
            .json(request)
            .send()
            .await
            .map_err(|e| unreachable_error(agent_url, e))?;
        decode(agent_url, response).await
    }

    pub async fn task_status(&self, agent_url: &str, task_id: &str) -> Result<TaskStatusResponse> {
        let response = self
            .http
            .get(format!("{agent_url}/task/{task_id}"))
            .timeout(domain_config::STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable_error(agent_url, e))?;
        decode(agent_url, response).await
    }

    /// Poll a task until it reaches a terminal state.
    pub async fn wait_for_task(
        &self,
        agent_url: &str,
        task_id: &str,
    ) -> Result<TaskStatusResponse> {
        loop {
            let status = self.task_status(agent_url, task_id).await?;
            if matches!(status.state.as_str(), "completed" | "failed" | "cancelled") {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    // ── Director queue endpoints ────────────────────────────────────

    pub async fn enqueue(
        &self,
        director_url: &str,
        request: &EnqueueRequest,
    ) -> Result<EnqueueResponse> {
        let response = self
            .authed(self.http.post(format!("{director_url}/api/queue/task")))
            .json(request)
            .send()
            .await
            .map_err(|e| unreachable_error(director_url, e))?;
        decode(director_url, response).await
    }

    pub async fn queue_stats(&self, director_url: &str) -> Result<QueueStatsResponse> {
        let response = self
            .authed(self.http.get(format!("{director_url}/api/queue")))
            .timeout(domain_config::STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable_error(director_url, e))?;
        decode(director_url, response).await
    }

    pub async fn queue_entry(
        &self,
        director_url: &str,
        queue_id: &str,
    ) -> Result<serde_json::Value> {
        let response = self
            .authed(self.http.get(format!("{director_url}/api/queue/{queue_id}")))
            .timeout(domain_config::STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable_error(director_url, e))?;
        decode(director_url, response).await
    }

    pub async fn queue_cancel(
        &self,
        director_url: &str,
        queue_id: &str,
    ) -> Result<CancelQueueResponse> {
        let response = self
            .authed(
                self.http
                    .post(format!("{director_url}/api/queue/{queue_id}/cancel")),
            )
            .send()
            .await
            .map_err(|e| unreachable_error(director_url, e))?;
        decode(director_url, response).await
    }
}

fn unreachable_error(url: &str, e: reqwest::Error) -> Error {
    Error::Upstream {
        url: url.to_string(),
        message: e.to_string(),
    }
}

/// Decode a success body, or surface the server's error envelope.
async fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| Error::Upstream {
            url: url.to_string(),
            message: format!("bad response body: {e}"),
        });
    }
    match response.json::<ErrorBody>().await {
        Ok(envelope) => Err(envelope_to_error(envelope)),
        Err(_) => Err(Error::Upstream {
            url: url.to_string(),
            message: format!("request failed with {status}"),
        }),
    }
}

/// Rebuild a typed error from a wire envelope so exit handling stays
/// uniform.
fn envelope_to_error(envelope: ErrorBody) -> Error {
    match envelope.error.as_str() {
        "agent_busy" => Error::AgentBusy,
        "queue_full" => Error::QueueFull(0),
        "validation_error" => Error::Validation(envelope.message),
        "not_found" => Error::NotFound(envelope.message),
        "job_not_found" => Error::JobNotFound(envelope.message),
        "already_completed" => Error::AlreadyCompleted(envelope.message),
        "unauthorized" => Error::Unauthorized,
        "rate_limited" => Error::RateLimited,
        "agent_not_found" => Error::AgentNotFound(envelope.message),
        "dispatch_lost" => Error::DispatchLost(envelope.message),
        "timeout" => Error::Timeout(envelope.message),
        _ => Error::Internal(envelope.message),
    }
}
