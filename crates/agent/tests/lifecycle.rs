//! End-to-end task lifecycle against a scripted fake runner.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ag_agent::config::AgentConfig;
use ag_agent::state::AgentState;
use ag_agent::supervisor;
use ag_agent::task::TaskState;
use ag_domain::{Result, Tier};
use ag_protocol::SubmitTaskRequest;
use ag_runner::parsers::ClaudeStreamParser;
use ag_runner::{ComponentRunner, RunnerHandle, RunnerOptions, RunnerRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Emits a fixed set of lines, then exits with the configured code. When
/// `hang` is set the stream never closes until killed.
struct ScriptedRunner {
    lines: Vec<String>,
    exit_code: i32,
    hang: bool,
}

struct ScriptedHandle {
    lines: VecDeque<String>,
    exit_code: i32,
    hang: bool,
}

#[async_trait::async_trait]
impl ComponentRunner for ScriptedRunner {
    fn kind(&self) -> &str {
        "claude"
    }

    async fn spawn(&self, _opts: RunnerOptions) -> Result<Box<dyn RunnerHandle>> {
        Ok(Box::new(ScriptedHandle {
            lines: self.lines.iter().cloned().collect(),
            exit_code: self.exit_code,
            hang: self.hang,
        }))
    }
}

#[async_trait::async_trait]
impl RunnerHandle for ScriptedHandle {
    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.pop_front() {
            return Some(line);
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        None
    }

    async fn wait(&mut self) -> Result<i32> {
        Ok(self.exit_code)
    }

    async fn kill(&mut self) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn happy_lines() -> Vec<String> {
    vec![
        r#"{"type":"system","subtype":"init","session_id":"prov-1"}"#.into(),
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello from runner"}]}}"#.into(),
        r#"{"type":"result","subtype":"success","result":"done"}"#.into(),
    ]
}

fn state_with_runner(dir: &std::path::Path, runner: ScriptedRunner) -> AgentState {
    let config = AgentConfig {
        name: "test-agent".into(),
        port: 0,
        agent_kind: "claude".into(),
        tier: Tier::Standard,
        history_dir: dir.join("history"),
        session_base: dir.join("sessions"),
        default_timeout_secs: 60,
    };
    let mut registry = RunnerRegistry::new();
    registry.register(Arc::new(runner), Arc::new(ClaudeStreamParser));
    AgentState::new(config, registry).unwrap()
}

fn request(prompt: &str) -> SubmitTaskRequest {
    SubmitTaskRequest {
        prompt: prompt.into(),
        tier: None,
        agent_kind: None,
        session_id: None,
        timeout_seconds: None,
        model: None,
    }
}

/// Run the supervisor for an accepted task and wait for it to finish.
async fn run_to_terminal(state: &AgentState, token: tokio_util::sync::CancellationToken) {
    let handle = tokio::spawn(supervisor::run_task(state.clone(), token));
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("supervisor should settle")
        .unwrap();
}

fn current_state(state: &AgentState) -> TaskState {
    state.current.read().as_ref().unwrap().state
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_path_completes_and_persists_history() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: happy_lines(), exit_code: 0, hang: false },
    );

    let (record, token) = state.accept_task(request("hello")).unwrap();
    run_to_terminal(&state, token).await;

    assert_eq!(current_state(&state), TaskState::Completed);
    let status = state.task_status(&record.task_id).unwrap().unwrap();
    assert_eq!(status.state, "completed");
    assert_eq!(status.exit_code, Some(0));
    assert!(status.output.contains("hello from runner"));

    // History outline + debug log are durable.
    let entry = state.history.get(&record.task_id).unwrap().unwrap();
    assert_eq!(entry.state, "completed");
    assert!(entry.has_debug_log);
    let log = state.history.get_debug_log(&record.task_id).unwrap().unwrap();
    assert!(String::from_utf8(log).unwrap().contains("hello from runner"));

    // Session lock released.
    assert!(!state.sessions.is_locked(&record.session_id));
}

#[tokio::test]
async fn clean_exit_without_complete_event_fails() {
    let dir = tempfile::tempdir().unwrap();
    let lines = vec![
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#.into(),
    ];
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines, exit_code: 0, hang: false },
    );

    let (record, token) = state.accept_task(request("p")).unwrap();
    run_to_terminal(&state, token).await;

    let status = state.task_status(&record.task_id).unwrap().unwrap();
    assert_eq!(status.state, "failed");
    assert_eq!(status.error.unwrap().kind, "runner_exit");
}

#[tokio::test]
async fn nonzero_exit_fails_with_code() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: happy_lines(), exit_code: 2, hang: false },
    );

    let (record, token) = state.accept_task(request("p")).unwrap();
    run_to_terminal(&state, token).await;

    let status = state.task_status(&record.task_id).unwrap().unwrap();
    assert_eq!(status.state, "failed");
    assert_eq!(status.exit_code, Some(2));
}

#[tokio::test]
async fn malformed_stream_is_a_parse_failure() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner {
            lines: vec!["this is not json".into()],
            exit_code: 0,
            hang: false,
        },
    );

    let (record, token) = state.accept_task(request("p")).unwrap();
    run_to_terminal(&state, token).await;

    let status = state.task_status(&record.task_id).unwrap().unwrap();
    assert_eq!(status.state, "failed");
    assert_eq!(status.error.unwrap().kind, "parse_error");
}

#[tokio::test]
async fn timeout_kills_the_runner() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: vec![], exit_code: 0, hang: true },
    );

    let mut req = request("p");
    req.timeout_seconds = Some(1);
    let (record, token) = state.accept_task(req).unwrap();
    run_to_terminal(&state, token).await;

    let status = state.task_status(&record.task_id).unwrap().unwrap();
    assert_eq!(status.state, "failed");
    assert_eq!(status.error.unwrap().kind, "timeout");
}

#[tokio::test]
async fn second_task_is_rejected_while_working() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: vec![], exit_code: 0, hang: true },
    );

    let (_record, token) = state.accept_task(request("first")).unwrap();
    let supervisor_task = tokio::spawn(supervisor::run_task(state.clone(), token.clone()));

    let err = state.accept_task(request("second")).unwrap_err();
    assert_eq!(err.code(), "agent_busy");

    token.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), supervisor_task).await;
}

#[tokio::test]
async fn cancel_wins_over_late_completion() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: vec![], exit_code: 0, hang: true },
    );

    let (record, token) = state.accept_task(request("p")).unwrap();
    let supervisor_task = tokio::spawn(supervisor::run_task(state.clone(), token));

    // Give the supervisor a moment to spawn the runner.
    tokio::time::sleep(Duration::from_millis(50)).await;
    state.cancel_task(&record.task_id).unwrap();

    // Cancellation is immediately visible and already in history.
    assert_eq!(current_state(&state), TaskState::Cancelled);
    let entry = state.history.get(&record.task_id).unwrap().unwrap();
    assert_eq!(entry.state, "cancelled");

    tokio::time::timeout(Duration::from_secs(5), supervisor_task)
        .await
        .expect("supervisor should settle")
        .unwrap();
    // The supervisor must not resurrect the task.
    assert_eq!(current_state(&state), TaskState::Cancelled);

    // A second cancel conflicts.
    let err = state.cancel_task(&record.task_id).unwrap_err();
    assert_eq!(err.code(), "already_completed");
}

#[tokio::test]
async fn session_reuse_after_terminal_and_invalid_ids() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: happy_lines(), exit_code: 0, hang: false },
    );

    let mut req = request("one");
    req.session_id = Some("sess-a".into());
    let (_r, token) = state.accept_task(req).unwrap();
    run_to_terminal(&state, token).await;

    // Same session can host the next task after terminal.
    let mut req = request("two");
    req.session_id = Some("sess-a".into());
    let (_r, token) = state.accept_task(req).unwrap();
    run_to_terminal(&state, token).await;

    // Traversal-shaped ids never pass.
    let mut req = request("three");
    req.session_id = Some("../etc".into());
    let err = state.accept_task(req).unwrap_err();
    assert_eq!(err.code(), "validation_error");
    assert!(!dir.path().join("etc").exists());
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_runner(
        dir.path(),
        ScriptedRunner { lines: vec![], exit_code: 0, hang: false },
    );
    let err = state.accept_task(request("   ")).unwrap_err();
    assert_eq!(err.code(), "validation_error");
}
