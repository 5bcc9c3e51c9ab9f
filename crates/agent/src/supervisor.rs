//! Runner supervisor: drives one accepted task to a terminal state.
//!
//! Reads the runner's line stream, feeds the provider parser, correlates
//! tool calls with results, and batches output into the task record at
//! state transitions rather than per event. Terminal handling writes the
//! history outline and debug log before the record is observable as done
//! elsewhere.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ag_protocol::TaskError;
use ag_runner::{RunnerOptions, ToolEvent};

use crate::state::{history_entry, AgentState};
use crate::task::{append_bounded, TaskState};

/// Grace before a spawned task is considered `working` even without a
/// first stream event.
const WORKING_GRACE: Duration = Duration::from_secs(2);
/// Debug-log accumulation bound.
const DEBUG_LOG_CAP: usize = 4 * 1024 * 1024;
const DEBUG_TRUNCATED: &str = "\n[debug log truncated]";

enum Outcome {
    Completed { exit: i32 },
    Failed { exit: Option<i32>, error: TaskError },
    Cancelled,
}

/// Run the current task to completion. Spawned once per accepted task.
pub async fn run_task(state: AgentState, cancel: CancellationToken) {
    let Some(task) = state.current.read().clone() else {
        return;
    };
    if task.state.is_terminal() {
        // Cancelled before the supervisor even started.
        return;
    }
    let task_id = task.task_id.clone();

    let Some(provider) = state.registry.get(&task.agent_kind) else {
        finalize(
            &state,
            &task_id,
            Outcome::Failed {
                exit: None,
                error: TaskError {
                    kind: "spawn_error".into(),
                    message: format!("no provider for agent kind {:?}", task.agent_kind),
                },
            },
            String::new(),
            String::new(),
            0,
        )
        .await;
        return;
    };

    let working_dir = match state.sessions.ensure_dir(&task.session_id) {
        Ok(dir) => dir,
        Err(e) => {
            finalize(
                &state,
                &task_id,
                Outcome::Failed {
                    exit: None,
                    error: TaskError {
                        kind: "spawn_error".into(),
                        message: format!("session directory: {e}"),
                    },
                },
                String::new(),
                String::new(),
                0,
            )
            .await;
            return;
        }
    };

    let timeout = Duration::from_secs(task.timeout_seconds);
    let spawn = provider
        .runner
        .spawn(RunnerOptions {
            prompt: task.prompt.clone(),
            tier: task.tier,
            model: task.model.clone(),
            working_dir,
            timeout,
        })
        .await;
    let mut handle = match spawn {
        Ok(handle) => handle,
        Err(e) => {
            finalize(
                &state,
                &task_id,
                Outcome::Failed {
                    exit: None,
                    error: TaskError {
                        kind: "spawn_error".into(),
                        message: e.to_string(),
                    },
                },
                String::new(),
                String::new(),
                0,
            )
            .await;
            return;
        }
    };

    let deadline = tokio::time::Instant::now() + timeout;
    let grace = tokio::time::Instant::now() + WORKING_GRACE;
    let mut debug_log = String::new();
    let mut output = String::new();
    let mut event_count: u64 = 0;
    let mut open_calls: HashSet<String> = HashSet::new();
    let mut seen_complete = false;
    let mut working = false;

    // The select loop never touches the handle outside its stream arm; it
    // only decides *why* supervision ends. Kill/wait happen after the loop.
    enum LoopExit {
        Cancelled,
        TimedOut,
        ParseError(String),
        StreamClosed,
    }

    let exit_reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break LoopExit::Cancelled,
            _ = state.shutdown.cancelled() => break LoopExit::Cancelled,
            _ = tokio::time::sleep_until(deadline) => break LoopExit::TimedOut,
            _ = tokio::time::sleep_until(grace), if !working => {
                mark_working(&state, &task_id);
                working = true;
            }
            line = handle.next_line() => {
                let Some(line) = line else {
                    break LoopExit::StreamClosed;
                };
                if !working {
                    mark_working(&state, &task_id);
                    working = true;
                }
                append_bounded(&mut debug_log, &line, DEBUG_LOG_CAP, DEBUG_TRUNCATED);
                append_bounded(&mut debug_log, "\n", DEBUG_LOG_CAP, DEBUG_TRUNCATED);

                let events = match provider.parser.parse_line(&line) {
                    Ok(events) => events,
                    Err(e) => break LoopExit::ParseError(e.to_string()),
                };
                for event in events {
                    match &event {
                        ToolEvent::ToolCall { tool_id, .. } => {
                            open_calls.insert(tool_id.clone());
                        }
                        ToolEvent::ToolResult { tool_id, .. } => {
                            if !open_calls.remove(tool_id) {
                                tracing::debug!(
                                    task_id = %task_id,
                                    tool_id = %tool_id,
                                    "dropping unmatched tool result"
                                );
                                continue;
                            }
                        }
                        ToolEvent::TextResponse { text } => {
                            append_bounded(
                                &mut output,
                                text,
                                crate::task::MAX_OUTPUT_BYTES,
                                crate::task::TRUNCATED_MARKER,
                            );
                            append_bounded(
                                &mut output,
                                "\n",
                                crate::task::MAX_OUTPUT_BYTES,
                                crate::task::TRUNCATED_MARKER,
                            );
                        }
                        ToolEvent::Complete { .. } => {
                            seen_complete = true;
                        }
                        ToolEvent::SessionInit { .. } => {}
                    }
                    state.ring.push(event);
                    event_count += 1;
                }
            }
        }
    };

    let outcome = match exit_reason {
        LoopExit::Cancelled => {
            let _ = handle.kill().await;
            Outcome::Cancelled
        }
        LoopExit::TimedOut => {
            let _ = handle.kill().await;
            Outcome::Failed {
                exit: None,
                error: TaskError {
                    kind: "timeout".into(),
                    message: format!("task exceeded its {}s timeout", task.timeout_seconds),
                },
            }
        }
        LoopExit::ParseError(message) => {
            let _ = handle.kill().await;
            Outcome::Failed {
                exit: None,
                error: TaskError {
                    kind: "parse_error".into(),
                    message,
                },
            }
        }
        LoopExit::StreamClosed => match handle.wait().await {
            Ok(0) if seen_complete => Outcome::Completed { exit: 0 },
            Ok(code) => Outcome::Failed {
                exit: Some(code),
                error: TaskError {
                    kind: "runner_exit".into(),
                    message: if code == 0 {
                        "runner exited without a complete event".into()
                    } else {
                        format!("runner exited with code {code}")
                    },
                },
            },
            Err(e) => Outcome::Failed {
                exit: None,
                error: TaskError {
                    kind: "runner_exit".into(),
                    message: e.to_string(),
                },
            },
        },
    };

    finalize(&state, &task_id, outcome, debug_log, output, event_count).await;
}

/// Transition `queued → working`. A no-op if the task was cancelled first.
fn mark_working(state: &AgentState, task_id: &str) {
    let mut current = state.current.write();
    if let Some(task) = current.as_mut().filter(|t| t.task_id == task_id) {
        if task.state == TaskState::Queued {
            let _ = task.transition(TaskState::Working);
            tracing::info!(task_id, "task working");
        }
    }
}

/// Persist history for the outcome, then commit the terminal state unless
/// cancellation already won.
///
/// History lands on disk *before* the record becomes observable as
/// terminal, so a poll that reports `completed` can rely on the outline
/// being durable. When a cancel won the race the commit is skipped, but
/// the completion is still written to history.
async fn finalize(
    state: &AgentState,
    task_id: &str,
    outcome: Outcome,
    debug_log: String,
    output: String,
    event_count: u64,
) {
    // Build the terminal record on a private clone.
    let mut finished = {
        let current = state.current.read();
        let Some(task) = current.as_ref().filter(|t| t.task_id == task_id) else {
            return;
        };
        task.clone()
    };
    if !finished.state.is_terminal() {
        finished.push_output(&output);
        finished.event_count = event_count;
        match outcome {
            Outcome::Completed { exit } => {
                if finished.state == TaskState::Queued {
                    let _ = finished.transition(TaskState::Working);
                }
                let _ = finished.transition(TaskState::Completed);
                finished.exit_code = Some(exit);
            }
            Outcome::Failed { exit, error } => {
                let _ = finished.transition(TaskState::Failed);
                finished.exit_code = exit;
                finished.error = Some(error);
            }
            Outcome::Cancelled => {
                let _ = finished.transition(TaskState::Cancelled);
                finished.error = Some(TaskError {
                    kind: "cancelled".into(),
                    message: "cancelled".into(),
                });
            }
        }
    }

    tracing::info!(
        task_id,
        state = finished.state.as_str(),
        exit_code = ?finished.exit_code,
        events = finished.event_count,
        "task finished"
    );

    if let Err(e) = state.history.save(history_entry(&finished)) {
        tracing::warn!(task_id, error = %e, "history save failed");
    }
    if !debug_log.is_empty() {
        if let Err(e) = state.history.save_debug_log(task_id, debug_log.as_bytes()) {
            tracing::warn!(task_id, error = %e, "debug log save failed");
        }
    }

    // Commit. A record already terminal (cancelled by the API) stays as it
    // is — the first terminal state wins.
    {
        let mut current = state.current.write();
        if let Some(task) = current.as_mut().filter(|t| t.task_id == task_id) {
            if !task.state.is_terminal() {
                *task = finished.clone();
            }
        }
    }
    state.sessions.unlock(&finished.session_id);
}
