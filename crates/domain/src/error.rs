/// Shared error type used across all agency crates.
///
/// Each variant maps to one of the stable wire codes via [`Error::code`];
/// the HTTP layers translate codes to status lines, the CLI prints
/// `[<code>] <message>`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("agent is busy with another task")]
    AgentBusy,

    #[error("no matching agent: {0}")]
    AgentNotFound(String),

    #[error("queue is full (max {0})")]
    QueueFull(usize),

    #[error("task already completed: {0}")]
    AlreadyCompleted(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("upstream {url}: {message}")]
    Upstream { url: String, message: String },

    #[error("dispatch lost: {0}")]
    DispatchLost(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable wire code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::JobNotFound(_) => "job_not_found",
            Error::AgentBusy => "agent_busy",
            Error::AgentNotFound(_) => "agent_not_found",
            Error::QueueFull(_) => "queue_full",
            Error::AlreadyCompleted(_) => "already_completed",
            Error::Unauthorized => "unauthorized",
            Error::RateLimited => "rate_limited",
            Error::Upstream { .. } => "upstream_error",
            Error::DispatchLost(_) => "dispatch_lost",
            Error::Timeout(_) => "timeout",
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// HTTP status this error surfaces as.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized => 401,
            Error::NotFound(_) | Error::JobNotFound(_) | Error::AgentNotFound(_) => 404,
            Error::AgentBusy | Error::AlreadyCompleted(_) => 409,
            Error::RateLimited => 429,
            Error::Upstream { .. } | Error::DispatchLost(_) => 502,
            Error::QueueFull(_) => 503,
            Error::Timeout(_) => 504,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::AgentBusy.code(), "agent_busy");
        assert_eq!(Error::QueueFull(50).code(), "queue_full");
        assert_eq!(Error::Validation("bad".into()).code(), "validation_error");
        assert_eq!(Error::AlreadyCompleted("t1".into()).code(), "already_completed");
        assert_eq!(Error::DispatchLost("t1".into()).code(), "dispatch_lost");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(Error::Validation("x".into()).http_status(), 400);
        assert_eq!(Error::Unauthorized.http_status(), 401);
        assert_eq!(Error::NotFound("x".into()).http_status(), 404);
        assert_eq!(Error::AgentBusy.http_status(), 409);
        assert_eq!(Error::QueueFull(50).http_status(), 503);
    }

    #[test]
    fn message_includes_detail() {
        let err = Error::QueueFull(50);
        assert_eq!(err.to_string(), "queue is full (max 50)");
    }
}
