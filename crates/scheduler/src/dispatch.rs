//! Fire-and-forget job dispatch.
//!
//! A due job submits to its target's director queue; targets that don't
//! expose a queue (bare agents) get a direct task POST. Completion is
//! never tracked here — the history store is the source of truth. The
//! only record kept is the job's `last_error`.

use ag_domain::config as domain_config;
use ag_protocol::{EnqueueRequest, ErrorBody, SubmitTaskRequest};

use crate::jobs::Job;

/// Submit one due job. Returns `Err(message)` for the job's `last_error`.
pub async fn fire(client: &reqwest::Client, job: &Job) -> Result<(), String> {
    match submit_to_queue(client, job).await {
        QueueSubmit::Accepted => Ok(()),
        QueueSubmit::NoQueue => {
            // Target is not a director — fall back to a direct agent POST.
            submit_to_agent(client, job).await
        }
        QueueSubmit::Rejected(message) => Err(message),
    }
}

enum QueueSubmit {
    Accepted,
    /// Target has no queue endpoint (bare agent).
    NoQueue,
    Rejected(String),
}

async fn submit_to_queue(client: &reqwest::Client, job: &Job) -> QueueSubmit {
    let body = EnqueueRequest {
        prompt: job.prompt.clone(),
        tier: job.tier,
        agent_kind: job.agent_kind.clone(),
        session_id: None,
        timeout_seconds: job.timeout_seconds,
        source: Some("scheduler".into()),
        model: None,
    };
    let response = client
        .post(format!("{}/api/queue/task", job.target))
        .timeout(domain_config::SUBMIT_TIMEOUT)
        .json(&body)
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => return QueueSubmit::Rejected(format!("target unreachable: {e}")),
    };
    let status = response.status();
    if status.is_success() {
        return QueueSubmit::Accepted;
    }
    if status.as_u16() == 404 || status.as_u16() == 405 {
        return QueueSubmit::NoQueue;
    }
    let code = response
        .json::<ErrorBody>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| status.to_string());
    QueueSubmit::Rejected(code)
}

async fn submit_to_agent(client: &reqwest::Client, job: &Job) -> Result<(), String> {
    let body = SubmitTaskRequest {
        prompt: job.prompt.clone(),
        tier: job.tier,
        agent_kind: job.agent_kind.clone(),
        session_id: None,
        timeout_seconds: job.timeout_seconds,
        model: None,
    };
    let response = client
        .post(format!("{}/task", job.target))
        .timeout(domain_config::SUBMIT_TIMEOUT)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("target unreachable: {e}"))?;

    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let code = response
        .json::<ErrorBody>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| status.to_string());
    Err(code)
}
