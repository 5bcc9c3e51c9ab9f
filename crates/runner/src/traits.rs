//! The runner and parser seams.

use std::path::PathBuf;
use std::time::Duration;

use ag_domain::{Result, Tier};

use crate::event::ToolEvent;

/// Everything a runner needs to start one task.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub prompt: String,
    pub tier: Tier,
    /// Opaque model hint forwarded from the submitter, if any.
    pub model: Option<String>,
    /// Working directory (the task's session directory).
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// A spawned runner: a raw line stream, an exit status, and a kill switch.
#[async_trait::async_trait]
pub trait RunnerHandle: Send {
    /// Next raw output line; `None` once the stream closes.
    async fn next_line(&mut self) -> Option<String>;

    /// Wait for the process to exit and return its code. Call after the
    /// stream has closed.
    async fn wait(&mut self) -> Result<i32>;

    /// Ask the runner to stop: graceful signal, short grace, then force.
    async fn kill(&mut self) -> Result<()>;
}

/// Spawns the external CLI for an agent kind.
#[async_trait::async_trait]
pub trait ComponentRunner: Send + Sync {
    /// Agent kind this runner serves (`claude`, `codex`, ...).
    fn kind(&self) -> &str;

    async fn spawn(&self, opts: RunnerOptions) -> Result<Box<dyn RunnerHandle>>;
}

/// Turns raw stream lines into normalized [`ToolEvent`]s.
///
/// A malformed line is a parse error and fails the task; a well-formed line
/// the provider doesn't care about yields an empty vec.
pub trait StreamParser: Send + Sync {
    fn provider(&self) -> &str;

    fn parse_line(&self, line: &str) -> Result<Vec<ToolEvent>>;
}
