//! Fleet wire protocol: the HTTP/JSON contract between directors, agents,
//! the scheduler, and clients.
//!
//! Every component serves `GET /status` with a [`StatusResponse`]; agents
//! accept task submissions; directors accept queue submissions. Errors
//! travel as an [`ErrorBody`] envelope with a stable machine code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ag_domain::{ComponentState, Error, Role, Tier};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The error envelope every fleet endpoint returns on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine code (`agent_busy`, `queue_full`, ...).
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: code.into(),
            message: message.into(),
        }
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Universal component status reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub roles: Vec<Role>,
    pub version: String,
    pub state: ComponentState,
    pub uptime_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<CurrentTask>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Summary of the task an agent is currently working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentTask {
    pub id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub prompt_preview: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent task endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `POST /task` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Optional model hint, forwarded opaquely to the runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `POST /task` success reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    pub session_id: String,
}

/// Typed task failure carried on the wire and in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// `timeout`, `runner_exit`, `parse_error`, `spawn_error`, `cancelled`.
    pub kind: String,
    pub message: String,
}

/// `GET /task/{id}` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub duration_seconds: f64,
}

/// `DELETE /task/{id}` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskResponse {
    pub cancelled: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Director queue endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `POST /api/queue/task` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Submitter: `cli`, `ui`, `scheduler`, `api`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Optional model hint, forwarded opaquely to the agent runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `POST /api/queue/task` success reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub queue_id: String,
    pub position: usize,
    pub state: String,
}

/// One row of the `GET /api/queue` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTaskSummary {
    pub queue_id: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub prompt_preview: String,
    pub source: String,
}

/// `GET /api/queue` reply: backpressure stats plus task summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatsResponse {
    pub depth: usize,
    pub max_size: usize,
    pub oldest_age_seconds: f64,
    pub dispatched_count: usize,
    pub tasks: Vec<QueueTaskSummary>,
}

/// `POST /api/queue/{id}/cancel` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelQueueResponse {
    pub queue_id: String,
    pub was_dispatched: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Previews
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bytes of prompt kept in previews.
pub const PREVIEW_LEN: usize = 200;

/// First [`PREVIEW_LEN`] bytes of the prompt, `...`-suffixed when
/// truncated. Truncation never splits a UTF-8 character.
pub fn prompt_preview(prompt: &str) -> String {
    if prompt.len() <= PREVIEW_LEN {
        return prompt.to_string();
    }
    let mut cut = PREVIEW_LEN;
    while !prompt.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &prompt[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_short_prompt_untouched() {
        assert_eq!(prompt_preview("hello"), "hello");
    }

    #[test]
    fn preview_truncates_at_200_bytes() {
        let prompt = "x".repeat(450);
        let preview = prompt_preview(&prompt);
        assert_eq!(preview.len(), PREVIEW_LEN + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        // 2-byte chars straddling the 200-byte mark.
        let prompt = "é".repeat(150);
        let preview = prompt_preview(&prompt);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= PREVIEW_LEN + 3);
    }

    #[test]
    fn error_body_from_domain_error() {
        let body = ErrorBody::from(&Error::AgentBusy);
        assert_eq!(body.error, "agent_busy");
        assert!(!body.message.is_empty());
    }

    #[test]
    fn status_response_roundtrip() {
        let status = StatusResponse {
            roles: vec![Role::Agent],
            version: "0.1.0".into(),
            state: ComponentState::Idle,
            uptime_seconds: 12.5,
            agent_kind: Some("claude".into()),
            tier: Some(Tier::Standard),
            current_task: None,
            config: serde_json::json!({"port": 9000}),
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: StatusResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.roles, vec![Role::Agent]);
        assert_eq!(back.agent_kind.as_deref(), Some("claude"));
    }

    #[test]
    fn enqueue_request_minimal_json() {
        let req: EnqueueRequest =
            serde_json::from_str(r#"{"prompt":"hello"}"#).unwrap();
        assert_eq!(req.prompt, "hello");
        assert!(req.tier.is_none());
        assert!(req.source.is_none());
    }
}
