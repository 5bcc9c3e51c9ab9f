//! Agent runtime configuration, assembled from CLI flags plus the shared
//! environment.

use std::path::PathBuf;

use ag_domain::{AgencyEnv, Tier};

/// Default task timeout when the submitter doesn't set one.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name used for the history directory (`history/<name>/`).
    pub name: String,
    pub port: u16,
    /// The provider kind this agent runs (`claude`, `codex`, ...).
    pub agent_kind: String,
    pub tier: Tier,
    pub history_dir: PathBuf,
    pub session_base: PathBuf,
    pub default_timeout_secs: u64,
}

impl AgentConfig {
    pub fn new(
        env: &AgencyEnv,
        name: String,
        port: u16,
        agent_kind: String,
        tier: Tier,
    ) -> Self {
        Self {
            history_dir: env.history_dir(&name),
            session_base: env.session_base(&name),
            name,
            port,
            agent_kind,
            tier,
            default_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}
