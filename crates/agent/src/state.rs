//! Shared agent state and the single-task admission logic.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ag_domain::{ComponentState, Error, Result, Role};
use ag_history::{HistoryEntry, HistoryStore};
use ag_protocol::{
    prompt_preview, CurrentTask, StatusResponse, SubmitTaskRequest, TaskStatusResponse,
};
use ag_runner::RunnerRegistry;

use crate::config::AgentConfig;
use crate::ring::EventRing;
use crate::sessions::SessionManager;
use crate::task::{TaskRecord, TaskState};

/// Shared state passed to all handlers and the supervisor.
#[derive(Clone)]
pub struct AgentState {
    pub config: Arc<AgentConfig>,
    /// The current (or most recent) task. One task at a time; a new accept
    /// displaces a terminal predecessor.
    pub current: Arc<RwLock<Option<TaskRecord>>>,
    /// Cancel token for the running supervisor, if any.
    pub cancel_current: Arc<Mutex<Option<CancellationToken>>>,
    pub history: Arc<HistoryStore>,
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<RunnerRegistry>,
    pub ring: Arc<EventRing>,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl AgentState {
    pub fn new(config: AgentConfig, registry: RunnerRegistry) -> Result<Self> {
        let history = HistoryStore::open(&config.history_dir)?;
        let sessions = SessionManager::new(&config.session_base)?;
        if registry.get(&config.agent_kind).is_none() {
            return Err(Error::Config(format!(
                "no provider registered for agent kind {:?} (have: {})",
                config.agent_kind,
                registry.kinds().join(", ")
            )));
        }
        Ok(Self {
            config: Arc::new(config),
            current: Arc::new(RwLock::new(None)),
            cancel_current: Arc::new(Mutex::new(None)),
            history: Arc::new(history),
            sessions: Arc::new(sessions),
            registry: Arc::new(registry),
            ring: Arc::new(EventRing::default()),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Component state as advertised in `/status`.
    pub fn component_state(&self) -> ComponentState {
        if self.shutdown.is_cancelled() {
            return ComponentState::Stopping;
        }
        match self.current.read().as_ref() {
            Some(task) if !task.state.is_terminal() => ComponentState::Working,
            _ => ComponentState::Idle,
        }
    }

    pub fn status(&self) -> StatusResponse {
        let current_task = self.current.read().as_ref().and_then(|task| {
            if task.state.is_terminal() {
                None
            } else {
                Some(CurrentTask {
                    id: task.task_id.clone(),
                    started_at: task.started_at,
                    prompt_preview: prompt_preview(&task.prompt),
                })
            }
        });
        StatusResponse {
            roles: vec![Role::Agent],
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: self.component_state(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            agent_kind: Some(self.config.agent_kind.clone()),
            tier: Some(self.config.tier),
            current_task,
            config: serde_json::json!({
                "name": self.config.name,
                "port": self.config.port,
                "providers": self.registry.kinds(),
                "ring_events": self.ring.total(),
            }),
        }
    }

    /// Admit a task, enforcing the single-task invariant and the session
    /// gate. Returns the new record and its cancel token; the caller spawns
    /// the supervisor.
    pub fn accept_task(
        &self,
        req: SubmitTaskRequest,
    ) -> Result<(TaskRecord, CancellationToken)> {
        if req.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".into()));
        }
        if let Some(kind) = &req.agent_kind {
            if kind != &self.config.agent_kind {
                return Err(Error::Validation(format!(
                    "this agent runs kind {:?}, not {:?}",
                    self.config.agent_kind, kind
                )));
            }
        }

        let session_id = match &req.session_id {
            Some(id) => {
                crate::sessions::validate_session_id(id)?;
                id.clone()
            }
            None => Uuid::new_v4().to_string(),
        };
        // Session path must resolve under the base before we commit.
        self.sessions.resolve(&session_id)?;
        self.sessions.lock(&session_id)?;

        let record = TaskRecord::new(
            Uuid::new_v4().to_string(),
            req.prompt,
            req.tier.unwrap_or(self.config.tier),
            self.config.agent_kind.clone(),
            session_id.clone(),
            req.model,
            req.timeout_seconds
                .unwrap_or(self.config.default_timeout_secs)
                .max(1),
        );

        let token = CancellationToken::new();
        {
            let mut current = self.current.write();
            if let Some(task) = current.as_ref() {
                if !task.state.is_terminal() {
                    self.sessions.unlock(&session_id);
                    return Err(Error::AgentBusy);
                }
            }
            *current = Some(record.clone());
            // Published together with the record, under its lock, so a
            // racing cancel can never pair the record with a stale token.
            *self.cancel_current.lock() = Some(token.clone());
        }

        tracing::info!(
            task_id = %record.task_id,
            session_id = %session_id,
            tier = %record.tier,
            "task accepted"
        );
        Ok((record, token))
    }

    /// `DELETE /task/{id}`: cancel the current task. The first terminal
    /// state wins; history is written before this returns.
    pub fn cancel_task(&self, task_id: &str) -> Result<()> {
        let record = {
            let mut current = self.current.write();
            match current.as_mut() {
                Some(task) if task.task_id == task_id => {
                    if task.state.is_terminal() {
                        return Err(Error::AlreadyCompleted(task_id.to_string()));
                    }
                    task.transition(TaskState::Cancelled)?;
                    task.error = Some(ag_protocol::TaskError {
                        kind: "cancelled".into(),
                        message: "cancelled by request".into(),
                    });
                    task.clone()
                }
                // Not the live task — distinguish finished from unknown.
                _ => {
                    drop(current);
                    return match self.history.get(task_id)? {
                        Some(_) => Err(Error::AlreadyCompleted(task_id.to_string())),
                        None => Err(Error::NotFound(format!("task {task_id}"))),
                    };
                }
            }
        };

        // Durable before the response reports the terminal state.
        self.history.save(history_entry(&record))?;
        self.sessions.unlock(&record.session_id);

        if let Some(token) = self.cancel_current.lock().take() {
            token.cancel();
        }
        tracing::info!(task_id, "task cancelled");
        Ok(())
    }

    /// `GET /task/{id}`: the live record, falling back to history.
    pub fn task_status(&self, task_id: &str) -> Result<Option<TaskStatusResponse>> {
        if let Some(task) = self
            .current
            .read()
            .as_ref()
            .filter(|t| t.task_id == task_id)
        {
            return Ok(Some(TaskStatusResponse {
                task_id: task.task_id.clone(),
                state: task.state.as_str().to_string(),
                exit_code: task.exit_code,
                output: task.output.clone(),
                error: task.error.clone(),
                duration_seconds: task.duration_seconds(),
            }));
        }
        Ok(self.history.get(task_id)?.map(|entry| TaskStatusResponse {
            task_id: entry.task_id,
            state: entry.state,
            exit_code: None,
            output: entry.output,
            error: entry.error,
            duration_seconds: entry.duration_seconds,
        }))
    }
}

/// Project a task record into its history entry.
pub fn history_entry(task: &TaskRecord) -> HistoryEntry {
    HistoryEntry {
        task_id: task.task_id.clone(),
        session_id: Some(task.session_id.clone()),
        state: task.state.as_str().to_string(),
        prompt: task.prompt.clone(),
        prompt_preview: String::new(),
        tier: task.tier,
        started_at: task.started_at,
        completed_at: task.completed_at.unwrap_or_else(chrono::Utc::now),
        duration_seconds: task.duration_seconds(),
        output: task.output.clone(),
        error: task.error.clone(),
        has_debug_log: false,
    }
}
