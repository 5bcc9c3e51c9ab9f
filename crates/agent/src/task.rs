//! The per-task record and its state machine.
//!
//! Transitions are linear and monotonic; terminal states are absorbing.
//! The record is constructed fully initialized and only ever mutated under
//! the agent's task lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ag_domain::{Error, Result, Tier};
use ag_protocol::TaskError;

/// Captured-output bound: 1 MiB, then a truncation marker.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;
/// Marker appended once when output hits the bound.
pub const TRUNCATED_MARKER: &str = "\n[_truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Working,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Legal edges of the state machine.
    pub fn can_transition(self, to: TaskState) -> bool {
        match (self, to) {
            (Self::Queued, Self::Working) => true,
            // A queued task can fail (spawn error) or be cancelled before
            // the runner starts, but never complete without working.
            (Self::Queued, Self::Failed | Self::Cancelled) => true,
            (Self::Working, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The agent's record of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub prompt: String,
    pub tier: Tier,
    pub agent_kind: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub event_count: u64,
    pub timeout_seconds: u64,
}

impl TaskRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: String,
        prompt: String,
        tier: Tier,
        agent_kind: String,
        session_id: String,
        model: Option<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            task_id,
            prompt,
            tier,
            agent_kind,
            session_id,
            model,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            state: TaskState::Queued,
            exit_code: None,
            output: String::new(),
            error: None,
            event_count: 0,
            timeout_seconds,
        }
    }

    /// Apply a state transition, rejecting illegal edges.
    pub fn transition(&mut self, to: TaskState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(Error::Internal(format!(
                "illegal task transition {} -> {}",
                self.state.as_str(),
                to.as_str()
            )));
        }
        self.state = to;
        match to {
            TaskState::Working => self.started_at = Some(Utc::now()),
            _ if to.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Append runner output, bounded at [`MAX_OUTPUT_BYTES`].
    pub fn push_output(&mut self, text: &str) {
        append_bounded(&mut self.output, text, MAX_OUTPUT_BYTES, TRUNCATED_MARKER);
    }

    /// Wall-clock duration: start → completion, or start → now while
    /// working.
    pub fn duration_seconds(&self) -> f64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).as_seconds_f64().max(0.0),
            (Some(start), None) => (Utc::now() - start).as_seconds_f64().max(0.0),
            _ => 0.0,
        }
    }
}

/// Append `text` to `buf`, never growing past `cap` bytes; the first
/// overflow appends `marker` and later pushes are dropped.
pub fn append_bounded(buf: &mut String, text: &str, cap: usize, marker: &str) {
    if buf.len() >= cap {
        return;
    }
    let room = cap - buf.len();
    if text.len() <= room {
        buf.push_str(text);
        return;
    }
    let mut cut = room;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    buf.push_str(&text[..cut]);
    buf.push_str(marker);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(
            "t1".into(),
            "do the thing".into(),
            Tier::Standard,
            "claude".into(),
            "s1".into(),
            None,
            600,
        )
    }

    // ── State machine ───────────────────────────────────────────────

    #[test]
    fn linear_happy_path() {
        let mut task = record();
        assert_eq!(task.state, TaskState::Queued);
        task.transition(TaskState::Working).unwrap();
        assert!(task.started_at.is_some());
        task.transition(TaskState::Completed).unwrap();
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [TaskState::Completed, TaskState::Failed, TaskState::Cancelled] {
            let mut task = record();
            task.transition(TaskState::Working).unwrap();
            task.transition(terminal).unwrap();
            for next in [
                TaskState::Queued,
                TaskState::Working,
                TaskState::Completed,
                TaskState::Failed,
                TaskState::Cancelled,
            ] {
                assert!(
                    task.transition(next).is_err(),
                    "{:?} -> {:?} must be rejected",
                    terminal,
                    next
                );
            }
        }
    }

    #[test]
    fn queued_can_cancel_or_fail_directly() {
        let mut task = record();
        task.transition(TaskState::Cancelled).unwrap();

        let mut task = record();
        task.transition(TaskState::Failed).unwrap();

        let task = record();
        assert!(!task.state.can_transition(TaskState::Completed));
    }

    #[test]
    fn working_cannot_requeue() {
        let mut task = record();
        task.transition(TaskState::Working).unwrap();
        assert!(task.transition(TaskState::Queued).is_err());
        assert!(task.transition(TaskState::Working).is_err());
    }

    // ── Output bounding ─────────────────────────────────────────────

    #[test]
    fn output_truncates_at_bound_with_marker() {
        let mut task = record();
        task.push_output(&"a".repeat(MAX_OUTPUT_BYTES - 10));
        task.push_output(&"b".repeat(100));

        assert!(task.output.ends_with(TRUNCATED_MARKER));
        assert_eq!(
            task.output.len(),
            MAX_OUTPUT_BYTES + TRUNCATED_MARKER.len()
        );

        // Further pushes are dropped; the marker stays single.
        let len = task.output.len();
        task.push_output("more");
        assert_eq!(task.output.len(), len);
    }

    #[test]
    fn output_below_bound_is_untouched() {
        let mut task = record();
        task.push_output("hello ");
        task.push_output("world");
        assert_eq!(task.output, "hello world");
    }

    #[test]
    fn duration_uses_start_and_completion() {
        let mut task = record();
        assert_eq!(task.duration_seconds(), 0.0);
        task.transition(TaskState::Working).unwrap();
        task.transition(TaskState::Completed).unwrap();
        assert!(task.duration_seconds() >= 0.0);
    }
}
