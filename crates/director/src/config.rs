//! Director runtime configuration.

use std::path::PathBuf;

use ag_discovery::DiscoveryConfig;
use ag_domain::AgencyEnv;

#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub port: u16,
    pub queue_dir: PathBuf,
    pub queue_max_size: usize,
    pub discovery: DiscoveryConfig,
    /// Optional per-IP rate limit on the API (requests/second).
    pub rate_limit_rps: Option<u64>,
}

impl DirectorConfig {
    pub fn new(
        env: &AgencyEnv,
        port: u16,
        queue_max_size: usize,
        port_start: u16,
        port_end: u16,
    ) -> Self {
        Self {
            port,
            queue_dir: env.queue_dir(),
            queue_max_size,
            discovery: DiscoveryConfig {
                port_start,
                port_end,
                self_port: port,
                ..DiscoveryConfig::default()
            },
            rate_limit_rps: None,
        }
    }
}
