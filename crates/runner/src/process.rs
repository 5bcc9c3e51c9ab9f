//! Process-backed runner: spawns the provider CLI as a child process and
//! exposes its stdout as the line stream.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use ag_domain::{Error, Result};

use crate::traits::{ComponentRunner, RunnerHandle, RunnerOptions};

/// Grace period between the terminate signal and the force kill.
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Command template for one provider CLI.
#[derive(Debug, Clone)]
pub struct ProcessRunnerConfig {
    /// Agent kind served (`claude`, `codex`, ...).
    pub kind: String,
    pub program: String,
    /// Fixed arguments placed before the prompt.
    pub args: Vec<String>,
    /// Flag used to forward a model hint (`--model`), when supported.
    pub model_flag: Option<String>,
}

pub struct ProcessRunner {
    config: ProcessRunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ComponentRunner for ProcessRunner {
    fn kind(&self) -> &str {
        &self.config.kind
    }

    async fn spawn(&self, opts: RunnerOptions) -> Result<Box<dyn RunnerHandle>> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        if let (Some(flag), Some(model)) = (&self.config.model_flag, &opts.model) {
            cmd.arg(flag).arg(model);
        }
        cmd.arg(&opts.prompt)
            .current_dir(&opts.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::Internal(format!(
            "spawning {}: {e}",
            self.config.program
        )))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("runner stdout not captured".into()))?;

        tracing::debug!(
            kind = %self.config.kind,
            program = %self.config.program,
            dir = %opts.working_dir.display(),
            "runner spawned"
        );

        Ok(Box::new(ProcessHandle {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

pub struct ProcessHandle {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait::async_trait]
impl RunnerHandle for ProcessHandle {
    async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "runner stream read failed");
                None
            }
        }
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&mut self) -> Result<()> {
        // Graceful first: SIGTERM, a short grace, then SIGKILL.
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
            if tokio::time::timeout(KILL_GRACE, self.child.wait())
                .await
                .is_ok()
            {
                return Ok(());
            }
        }
        self.child.start_kill()?;
        let _ = self.child.wait().await?;
        Ok(())
    }
}
