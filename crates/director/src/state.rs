//! Shared director state.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use ag_discovery::Discovery;
use ag_domain::{config as domain_config, ComponentState, Error, Result, Role};
use ag_protocol::StatusResponse;

use crate::config::DirectorConfig;
use crate::queue::WorkQueue;

#[derive(Clone)]
pub struct DirectorState {
    pub config: Arc<DirectorConfig>,
    pub queue: Arc<WorkQueue>,
    pub discovery: Arc<Discovery>,
    /// Client for forwarding tasks and polling agents. Per-request
    /// timeouts are set at the call sites.
    pub client: reqwest::Client,
    /// SHA-256 of `AG_WEB_PASSWORD`; `None` disables the auth filter.
    pub password_hash: Arc<Option<Vec<u8>>>,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl DirectorState {
    pub fn new(config: DirectorConfig, password_hash: Option<Vec<u8>>) -> Result<Self> {
        let queue = WorkQueue::open(&config.queue_dir, config.queue_max_size)?;
        let discovery = Discovery::new(config.discovery.clone())?;
        let client = reqwest::Client::builder()
            .timeout(domain_config::SUBMIT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("building http client: {e}")))?;
        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(queue),
            discovery: Arc::new(discovery),
            client,
            password_hash: Arc::new(password_hash),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn status(&self) -> StatusResponse {
        let stats = self.queue.stats();
        StatusResponse {
            roles: vec![Role::Director],
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: if self.shutdown.is_cancelled() {
                ComponentState::Stopping
            } else {
                ComponentState::Idle
            },
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            agent_kind: None,
            tier: None,
            current_task: None,
            config: serde_json::json!({
                "port": self.config.port,
                "queue_depth": stats.depth,
                "queue_max_size": stats.max_size,
                "scan_range": [
                    self.config.discovery.port_start,
                    self.config.discovery.port_end,
                ],
            }),
        }
    }
}
