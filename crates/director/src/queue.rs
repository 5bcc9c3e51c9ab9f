//! The work queue: FIFO admission, capacity, dispatch bookkeeping, and a
//! JSON snapshot on disk.
//!
//! Entries keep their submission order in one vector for their whole life;
//! a pending entry's `position` is its 1-based rank among pending entries,
//! so rewinding a failed dispatch restores the original position for free.
//! Every state transition is followed by an atomic snapshot write.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ag_domain::fsio::write_atomic;
use ag_domain::{Error, Result, Tier};
use ag_protocol::{
    prompt_preview, EnqueueRequest, EnqueueResponse, QueueStatsResponse, QueueTaskSummary,
    TaskError,
};

/// Default queue capacity (pending + dispatched).
pub const DEFAULT_MAX_SIZE: usize = 50;
/// Snapshot file name inside the queue directory.
pub const SNAPSHOT_FILE: &str = "queue.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QueueEntry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Pending,
    Dispatched,
    Completed,
    Failed,
    Cancelled,
}

impl QueueState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub queue_id: String,
    pub submitted_at: DateTime<Utc>,
    pub prompt: String,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub state: QueueState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

/// A queue entry plus its live pending position (1-based, `None` once the
/// entry is no longer pending).
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntryView {
    #[serde(flatten)]
    pub entry: QueueEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WorkQueue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WorkQueue {
    max_size: usize,
    snapshot_path: PathBuf,
    entries: Mutex<Vec<QueueEntry>>,
}

impl WorkQueue {
    /// Open the queue, loading any snapshot left by a previous run.
    /// Dispatched entries are *not* reconciled here — the dispatcher does
    /// that once it can reach agents.
    pub fn open(queue_dir: impl Into<PathBuf>, max_size: usize) -> Result<Self> {
        let queue_dir = queue_dir.into();
        std::fs::create_dir_all(&queue_dir)?;
        let snapshot_path = queue_dir.join(SNAPSHOT_FILE);

        let entries = match std::fs::read_to_string(&snapshot_path) {
            Ok(data) => {
                let entries: Vec<QueueEntry> = serde_json::from_str(&data)?;
                tracing::info!(count = entries.len(), "loaded queue snapshot");
                entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            max_size,
            snapshot_path,
            entries: Mutex::new(entries),
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Admit a submission, enforcing the capacity cap over pending plus
    /// dispatched entries.
    pub fn submit(&self, req: EnqueueRequest) -> Result<EnqueueResponse> {
        if req.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".into()));
        }
        let entry = QueueEntry {
            queue_id: Uuid::new_v4().to_string(),
            submitted_at: Utc::now(),
            prompt: req.prompt,
            tier: req.tier.unwrap_or_default(),
            agent_kind: req.agent_kind,
            session_id: req.session_id,
            source: req.source.unwrap_or_else(|| "api".into()),
            timeout_seconds: req.timeout_seconds,
            model: req.model,
            state: QueueState::Pending,
            dispatched_to: None,
            dispatched_task_id: None,
            dispatched_at: None,
            completed_at: None,
            error: None,
        };

        let (response, snapshot) = {
            let mut entries = self.entries.lock();
            let active = entries.iter().filter(|e| !e.state.is_terminal()).count();
            if active >= self.max_size {
                return Err(Error::QueueFull(self.max_size));
            }
            entries.push(entry.clone());
            let position = entries
                .iter()
                .filter(|e| e.state == QueueState::Pending)
                .count();
            (
                EnqueueResponse {
                    queue_id: entry.queue_id.clone(),
                    position,
                    state: QueueState::Pending.as_str().into(),
                },
                entries.clone(),
            )
        };
        self.persist(&snapshot);
        tracing::info!(
            queue_id = %response.queue_id,
            position = response.position,
            source = %entry.source,
            "task queued"
        );
        Ok(response)
    }

    /// Entry by id, with its live position.
    pub fn get(&self, queue_id: &str) -> Option<QueueEntryView> {
        let entries = self.entries.lock();
        let positions = pending_positions(&entries);
        entries.iter().find(|e| e.queue_id == queue_id).map(|e| {
            QueueEntryView {
                position: positions.get(&e.queue_id).copied(),
                entry: e.clone(),
            }
        })
    }

    /// Pending entries, head first.
    pub fn pending_snapshot(&self) -> Vec<QueueEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.state == QueueState::Pending)
            .cloned()
            .collect()
    }

    /// Dispatched entries awaiting settlement.
    pub fn dispatched_snapshot(&self) -> Vec<QueueEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.state == QueueState::Dispatched)
            .cloned()
            .collect()
    }

    /// Backpressure stats plus per-task summaries.
    pub fn stats(&self) -> QueueStatsResponse {
        let entries = self.entries.lock();
        let positions = pending_positions(&entries);
        let now = Utc::now();

        let depth = entries
            .iter()
            .filter(|e| e.state == QueueState::Pending)
            .count();
        let dispatched_count = entries
            .iter()
            .filter(|e| e.state == QueueState::Dispatched)
            .count();
        let oldest_age_seconds = entries
            .iter()
            .filter(|e| e.state == QueueState::Pending)
            .map(|e| (now - e.submitted_at).as_seconds_f64().max(0.0))
            .fold(0.0_f64, f64::max);

        let tasks = entries
            .iter()
            .map(|e| QueueTaskSummary {
                queue_id: e.queue_id.clone(),
                state: e.state.as_str().into(),
                position: positions.get(&e.queue_id).copied(),
                prompt_preview: prompt_preview(&e.prompt),
                source: e.source.clone(),
            })
            .collect();

        QueueStatsResponse {
            depth,
            max_size: self.max_size,
            oldest_age_seconds,
            dispatched_count,
            tasks,
        }
    }

    /// `pending → dispatched`, recording the target. Fails if the entry
    /// left pending in the meantime (e.g. a racing cancel).
    pub fn mark_dispatched(&self, queue_id: &str, agent_url: &str) -> Result<()> {
        self.transition(queue_id, |entry| {
            if entry.state != QueueState::Pending {
                return Err(Error::Internal(format!(
                    "entry {queue_id} is {}, not pending",
                    entry.state.as_str()
                )));
            }
            entry.state = QueueState::Dispatched;
            entry.dispatched_to = Some(agent_url.to_string());
            entry.dispatched_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Store the agent's acknowledged task id.
    pub fn record_dispatch_ack(&self, queue_id: &str, task_id: &str) -> Result<()> {
        self.transition(queue_id, |entry| {
            entry.dispatched_task_id = Some(task_id.to_string());
            Ok(())
        })
    }

    /// `dispatched → pending` after a transient forwarding failure. The
    /// entry keeps its slot, so its original position is restored.
    pub fn rewind_to_pending(&self, queue_id: &str) -> Result<()> {
        self.transition(queue_id, |entry| {
            if entry.state != QueueState::Dispatched {
                return Err(Error::Internal(format!(
                    "entry {queue_id} is {}, not dispatched",
                    entry.state.as_str()
                )));
            }
            entry.state = QueueState::Pending;
            entry.dispatched_to = None;
            entry.dispatched_task_id = None;
            entry.dispatched_at = None;
            Ok(())
        })
    }

    /// Mark an entry failed with a typed error.
    pub fn mark_failed(&self, queue_id: &str, error: TaskError) -> Result<()> {
        self.transition(queue_id, |entry| {
            if entry.state.is_terminal() {
                return Ok(()); // First terminal state wins.
            }
            entry.state = QueueState::Failed;
            entry.completed_at = Some(Utc::now());
            entry.error = Some(error.clone());
            Ok(())
        })
    }

    /// Settle a dispatched entry from the agent's terminal report. Ignored
    /// when the local record is already terminal (first terminal wins).
    pub fn settle(&self, queue_id: &str, terminal: QueueState) -> Result<()> {
        self.transition(queue_id, |entry| {
            if entry.state.is_terminal() || !terminal.is_terminal() {
                return Ok(());
            }
            entry.state = terminal;
            entry.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Cancel an entry. Returns the entry as it was *before* cancellation
    /// so the caller can fire the best-effort downstream cancel.
    pub fn cancel(&self, queue_id: &str) -> Result<QueueEntry> {
        let (before, snapshot) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.iter_mut().find(|e| e.queue_id == queue_id) else {
                return Err(Error::NotFound(format!("queue entry {queue_id}")));
            };
            if entry.state.is_terminal() {
                return Err(Error::AlreadyCompleted(queue_id.to_string()));
            }
            let before = entry.clone();
            entry.state = QueueState::Cancelled;
            entry.completed_at = Some(Utc::now());
            (before, entries.clone())
        };
        self.persist(&snapshot);
        tracing::info!(
            queue_id,
            was_dispatched = before.state == QueueState::Dispatched,
            "queue entry cancelled"
        );
        Ok(before)
    }

    /// Drop terminal entries older than `older_than`.
    pub fn prune_terminal(&self, older_than: chrono::Duration) {
        let cutoff = Utc::now() - older_than;
        let snapshot = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|e| {
                !e.state.is_terminal() || e.completed_at.map_or(true, |at| at > cutoff)
            });
            if entries.len() == before {
                return;
            }
            tracing::debug!(pruned = before - entries.len(), "pruned terminal queue entries");
            entries.clone()
        };
        self.persist(&snapshot);
    }

    // ── internals ───────────────────────────────────────────────────

    fn transition(
        &self,
        queue_id: &str,
        apply: impl FnOnce(&mut QueueEntry) -> Result<()>,
    ) -> Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.iter_mut().find(|e| e.queue_id == queue_id) else {
                return Err(Error::NotFound(format!("queue entry {queue_id}")));
            };
            apply(entry)?;
            entries.clone()
        };
        self.persist(&snapshot);
        Ok(())
    }

    /// Snapshot the full entry list to disk. Runs after the lock is
    /// released; errors are logged, not propagated — the in-memory queue
    /// stays authoritative.
    fn persist(&self, entries: &[QueueEntry]) {
        match serde_json::to_vec_pretty(entries) {
            Ok(json) => {
                if let Err(e) = write_atomic(&self.snapshot_path, &json) {
                    tracing::warn!(error = %e, "queue snapshot write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "queue snapshot encode failed"),
        }
    }
}

/// 1-based positions of pending entries, in submission order.
fn pending_positions(entries: &[QueueEntry]) -> HashMap<String, usize> {
    entries
        .iter()
        .filter(|e| e.state == QueueState::Pending)
        .enumerate()
        .map(|(i, e)| (e.queue_id.clone(), i + 1))
        .collect()
}
