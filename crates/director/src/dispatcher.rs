//! Dispatcher: the single background worker that moves pending queue
//! entries onto idle agents and settles dispatched ones.
//!
//! Lock discipline: queue state changes happen under the queue lock, all
//! HTTP happens after it is released. FIFO is strict — the walk stops the
//! moment the head cannot be placed, so a tail entry never overtakes it.

use std::collections::HashSet;
use std::time::Duration;

use ag_domain::{config as domain_config, ComponentState, Role};
use ag_protocol::{
    ErrorBody, SubmitTaskRequest, SubmitTaskResponse, TaskError, TaskStatusResponse,
};

use crate::queue::{QueueEntry, QueueState};
use crate::state::DirectorState;

/// Dispatch poll cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Dispatched entries are polled for completion every N ticks.
const SETTLE_EVERY_TICKS: u32 = 2;
/// Terminal entries linger this long for `GET /api/queue/{id}`.
const TERMINAL_RETENTION: chrono::Duration = chrono::Duration::hours(1);

/// Run the dispatcher until shutdown. Spawned once by `main`.
pub async fn run(state: DirectorState) {
    tracing::info!("dispatcher started");
    reconcile_after_restart(&state).await;

    let mut interval = tokio::time::interval(TICK_INTERVAL);
    let mut tick: u32 = 0;
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        dispatch_pending(&state).await;
        tick = tick.wrapping_add(1);
        if tick % SETTLE_EVERY_TICKS == 0 {
            settle_dispatched(&state).await;
            state.queue.prune_terminal(TERMINAL_RETENTION);
        }
    }
    tracing::info!("dispatcher stopped");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One dispatch pass: walk the pending queue head-first and place entries
/// on idle agents. Stops when the head cannot be placed.
pub async fn dispatch_pending(state: &DirectorState) {
    let pending = state.queue.pending_snapshot();
    if pending.is_empty() {
        return;
    }

    // Agents claimed during this pass. The discovery cache only learns an
    // agent went busy on its next scan, so the pass must not hand two
    // entries to the same agent.
    let mut claimed: HashSet<String> = HashSet::new();
    let agents = state.discovery.agents();

    for entry in pending {
        let Some(agent) = agents.iter().find(|a| {
            a.has_role(Role::Agent)
                && a.state == ComponentState::Idle
                && !claimed.contains(&a.url)
                && match entry.agent_kind.as_deref() {
                    Some(kind) => a.agent_kind.as_deref() == Some(kind),
                    None => true,
                }
        }) else {
            // The head cannot be placed — keep FIFO, stop the walk.
            break;
        };

        if state.queue.mark_dispatched(&entry.queue_id, &agent.url).is_err() {
            // The entry left pending under us (e.g. cancelled). Skip it.
            continue;
        }
        claimed.insert(agent.url.clone());

        match forward_task(state, &entry, &agent.url).await {
            ForwardOutcome::Accepted(task_id) => {
                let _ = state.queue.record_dispatch_ack(&entry.queue_id, &task_id);
                tracing::info!(
                    queue_id = %entry.queue_id,
                    agent = %agent.url,
                    task_id = %task_id,
                    "task dispatched"
                );
            }
            ForwardOutcome::Transient(reason) => {
                tracing::warn!(
                    queue_id = %entry.queue_id,
                    agent = %agent.url,
                    reason = %reason,
                    "dispatch failed, rewinding"
                );
                let _ = state.queue.rewind_to_pending(&entry.queue_id);
                // The head failed to place — stop walking this tick.
                break;
            }
            ForwardOutcome::Permanent(error) => {
                tracing::warn!(
                    queue_id = %entry.queue_id,
                    agent = %agent.url,
                    code = %error.kind,
                    "dispatch rejected permanently"
                );
                let _ = state.queue.mark_failed(&entry.queue_id, error);
            }
        }
    }
}

enum ForwardOutcome {
    Accepted(String),
    /// Agent busy or unreachable — retry next tick.
    Transient(String),
    /// Agent rejected the task outright — the entry fails.
    Permanent(TaskError),
}

async fn forward_task(state: &DirectorState, entry: &QueueEntry, agent_url: &str) -> ForwardOutcome {
    let body = SubmitTaskRequest {
        prompt: entry.prompt.clone(),
        tier: Some(entry.tier),
        agent_kind: entry.agent_kind.clone(),
        session_id: entry.session_id.clone(),
        timeout_seconds: entry.timeout_seconds,
        model: entry.model.clone(),
    };
    let response = state
        .client
        .post(format!("{agent_url}/task"))
        .timeout(domain_config::SUBMIT_TIMEOUT)
        .json(&body)
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => return ForwardOutcome::Transient(e.to_string()),
    };
    let status = response.status();

    if status.is_success() {
        return match response.json::<SubmitTaskResponse>().await {
            Ok(ack) => ForwardOutcome::Accepted(ack.task_id),
            Err(e) => ForwardOutcome::Transient(format!("bad acknowledgement: {e}")),
        };
    }

    let envelope = response.json::<ErrorBody>().await.ok();
    let code = envelope.as_ref().map(|e| e.error.as_str()).unwrap_or("");
    if status.as_u16() == 409 || code == "agent_busy" {
        // The cache was stale — the agent took other work first.
        return ForwardOutcome::Transient("agent_busy".into());
    }
    if status.is_client_error() {
        // A bare 404 means the URL no longer serves an agent at all.
        let kind = if !code.is_empty() {
            code.to_string()
        } else if status.as_u16() == 404 {
            "agent_not_found".into()
        } else {
            "validation_error".into()
        };
        return ForwardOutcome::Permanent(TaskError {
            kind,
            message: envelope
                .map(|e| e.message)
                .unwrap_or_else(|| format!("agent returned {status}")),
        });
    }
    ForwardOutcome::Transient(format!("agent returned {status}"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settlement
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Poll dispatched entries' agents and settle local state from their
/// terminal reports. Cancelled entries ignore late reports (first terminal
/// wins inside [`WorkQueue::settle`]).
pub async fn settle_dispatched(state: &DirectorState) {
    for entry in state.queue.dispatched_snapshot() {
        let (Some(agent_url), Some(task_id)) =
            (entry.dispatched_to.as_deref(), entry.dispatched_task_id.as_deref())
        else {
            continue;
        };
        match poll_task(state, agent_url, task_id).await {
            TaskPoll::Terminal(terminal) => {
                let _ = state.queue.settle(&entry.queue_id, terminal);
                tracing::info!(
                    queue_id = %entry.queue_id,
                    state = terminal.as_str(),
                    "dispatched task settled"
                );
            }
            TaskPoll::Gone => {
                tracing::warn!(
                    queue_id = %entry.queue_id,
                    agent = %agent_url,
                    "agent no longer reports the task"
                );
                let _ = state.queue.mark_failed(
                    &entry.queue_id,
                    TaskError {
                        kind: "dispatch_lost".into(),
                        message: format!("{agent_url} no longer reports task {task_id}"),
                    },
                );
            }
            TaskPoll::Running | TaskPoll::Unreachable => {}
        }
    }
}

/// On startup, every dispatched entry in the loaded snapshot is checked
/// against its agent; tasks the agent no longer reports become `failed`
/// with `dispatch_lost`.
async fn reconcile_after_restart(state: &DirectorState) {
    let dispatched = state.queue.dispatched_snapshot();
    if dispatched.is_empty() {
        return;
    }
    tracing::info!(count = dispatched.len(), "reconciling dispatched entries");
    for entry in dispatched {
        let lost = match (entry.dispatched_to.as_deref(), entry.dispatched_task_id.as_deref()) {
            (Some(url), Some(task_id)) => {
                matches!(poll_task(state, url, task_id).await, TaskPoll::Gone | TaskPoll::Unreachable)
            }
            _ => true, // Dispatched but never acknowledged — the send was lost.
        };
        if lost {
            let _ = state.queue.mark_failed(
                &entry.queue_id,
                TaskError {
                    kind: "dispatch_lost".into(),
                    message: "agent no longer reports this task".into(),
                },
            );
        }
    }
}

enum TaskPoll {
    Running,
    Terminal(QueueState),
    /// Agent answered but doesn't know the task.
    Gone,
    Unreachable,
}

async fn poll_task(state: &DirectorState, agent_url: &str, task_id: &str) -> TaskPoll {
    let response = state
        .client
        .get(format!("{agent_url}/task/{task_id}"))
        .timeout(domain_config::STATUS_TIMEOUT)
        .send()
        .await;
    let response = match response {
        Ok(r) => r,
        Err(_) => return TaskPoll::Unreachable,
    };
    if response.status().as_u16() == 404 {
        return TaskPoll::Gone;
    }
    if !response.status().is_success() {
        return TaskPoll::Unreachable;
    }
    match response.json::<TaskStatusResponse>().await {
        Ok(status) => match status.state.as_str() {
            "completed" => TaskPoll::Terminal(QueueState::Completed),
            "failed" => TaskPoll::Terminal(QueueState::Failed),
            "cancelled" => TaskPoll::Terminal(QueueState::Cancelled),
            _ => TaskPoll::Running,
        },
        Err(_) => TaskPoll::Unreachable,
    }
}
