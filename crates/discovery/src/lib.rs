//! Component discovery: scan a TCP port range, classify `/status`
//! responders, and keep a live cache with failure-based eviction.
//!
//! Each scan iteration completes before the next starts; probes within a
//! scan run concurrently and their results are applied to the cache under
//! a single write lock. A record survives transient blips: it is only
//! evicted after `max_failures` consecutive failed probes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use ag_domain::{ComponentState, Error, Result, Role, Tier};
use ag_protocol::StatusResponse;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub host: String,
    pub port_start: u16,
    pub port_end: u16,
    /// This component's own port, skipped during scans.
    pub self_port: u16,
    pub refresh_interval: Duration,
    pub probe_timeout: Duration,
    /// Consecutive failed probes before a record is evicted.
    pub max_failures: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port_start: 8700,
            port_end: 8720,
            self_port: 0,
            refresh_interval: Duration::from_secs(1),
            probe_timeout: ag_domain::config::PROBE_TIMEOUT,
            max_failures: 3,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ComponentRecord + cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A live component as seen by the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub url: String,
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub state: ComponentState,
    pub version: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub failures: u32,
}

impl ComponentRecord {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Port-keyed cache of live components.
///
/// Separated from the scanner so eviction semantics are testable without
/// sockets.
pub struct ComponentCache {
    max_failures: u32,
    components: RwLock<HashMap<u16, ComponentRecord>>,
}

impl ComponentCache {
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures,
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Record a successful probe: reset the failure count, refresh
    /// `last_seen`, replace the classification.
    pub fn apply_success(&self, port: u16, url: String, status: StatusResponse) {
        let record = ComponentRecord {
            url,
            roles: status.roles,
            agent_kind: status.agent_kind,
            tier: status.tier,
            state: status.state,
            version: status.version,
            last_seen: Utc::now(),
            failures: 0,
        };
        let mut components = self.components.write();
        if components.insert(port, record).is_none() {
            tracing::info!(port, "component discovered");
        }
    }

    /// Record a failed probe. Evicts the record once the failure count
    /// reaches the cap; returns `true` if an eviction happened.
    pub fn apply_failure(&self, port: u16) -> bool {
        let mut components = self.components.write();
        let Some(record) = components.get_mut(&port) else {
            return false;
        };
        record.failures += 1;
        if record.failures >= self.max_failures {
            let url = record.url.clone();
            components.remove(&port);
            tracing::info!(port, url = %url, "component evicted after repeated failures");
            return true;
        }
        false
    }

    pub fn all(&self) -> Vec<ComponentRecord> {
        let mut records: Vec<ComponentRecord> =
            self.components.read().values().cloned().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }

    pub fn with_role(&self, role: Role) -> Vec<ComponentRecord> {
        self.all().into_iter().filter(|r| r.has_role(role)).collect()
    }

    pub fn get(&self, url: &str) -> Option<ComponentRecord> {
        self.components
            .read()
            .values()
            .find(|r| r.url == url)
            .cloned()
    }

    /// First idle agent whose advertised kind matches, by URL order for a
    /// deterministic pick.
    pub fn idle_agent(&self, agent_kind: Option<&str>) -> Option<ComponentRecord> {
        self.all().into_iter().find(|r| {
            r.has_role(Role::Agent)
                && r.state == ComponentState::Idle
                && match agent_kind {
                    Some(kind) => r.agent_kind.as_deref() == Some(kind),
                    None => true,
                }
        })
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discovery service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Discovery {
    config: DiscoveryConfig,
    cache: Arc<ComponentCache>,
    client: reqwest::Client,
    cancel: CancellationToken,
    scan_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            // Loopback components may serve self-signed HTTPS.
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Internal(format!("building probe client: {e}")))?;
        Ok(Self {
            cache: Arc::new(ComponentCache::new(config.max_failures)),
            config,
            client,
            cancel: CancellationToken::new(),
            scan_task: Mutex::new(None),
        })
    }

    /// Spawn the scan loop. Idempotent: a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.scan_task.lock();
        if guard.is_some() {
            return;
        }
        let discovery = self.clone();
        *guard = Some(tokio::spawn(async move {
            tracing::info!(
                start = discovery.config.port_start,
                end = discovery.config.port_end,
                "discovery scan loop started"
            );
            loop {
                discovery.scan_once().await;
                tokio::select! {
                    _ = discovery.cancel.cancelled() => break,
                    _ = tokio::time::sleep(discovery.config.refresh_interval) => {}
                }
            }
            tracing::info!("discovery scan loop stopped");
        }));
    }

    /// Cancel the scan loop and wait for it to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.scan_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// One full scan of the port range. Probes run concurrently; results
    /// apply in port order.
    pub async fn scan_once(&self) {
        let ports: Vec<u16> = (self.config.port_start..=self.config.port_end)
            .filter(|p| *p != self.config.self_port)
            .collect();

        let probes = ports.iter().map(|port| {
            let client = self.client.clone();
            let host = self.config.host.clone();
            let port = *port;
            async move { (port, probe_status(&client, &host, port).await) }
        });

        for (port, outcome) in join_all(probes).await {
            match outcome {
                Some((url, status)) => self.cache.apply_success(port, url, status),
                None => {
                    self.cache.apply_failure(port);
                }
            }
        }
    }

    pub fn cache(&self) -> &Arc<ComponentCache> {
        &self.cache
    }

    pub fn agents(&self) -> Vec<ComponentRecord> {
        self.cache.with_role(Role::Agent)
    }

    pub fn directors(&self) -> Vec<ComponentRecord> {
        self.cache.with_role(Role::Director)
    }

    pub fn all_components(&self) -> Vec<ComponentRecord> {
        self.cache.all()
    }

    pub fn get_component(&self, url: &str) -> Option<ComponentRecord> {
        self.cache.get(url)
    }

    pub fn idle_agent(&self, agent_kind: Option<&str>) -> Option<ComponentRecord> {
        self.cache.idle_agent(agent_kind)
    }
}

/// Probe one port, `http://` first then `https://`. A reply only counts
/// when it is 2xx and parses as a status document.
async fn probe_status(
    client: &reqwest::Client,
    host: &str,
    port: u16,
) -> Option<(String, StatusResponse)> {
    for scheme in ["http", "https"] {
        let base = format!("{scheme}://{host}:{port}");
        let url = format!("{base}/status");
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<StatusResponse>().await {
                    Ok(status) => return Some((base, status)),
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "unparseable status reply");
                        return None;
                    }
                }
            }
            Ok(resp) => {
                tracing::debug!(url = %url, status = %resp.status(), "non-2xx status reply");
                return None;
            }
            Err(_) => {
                // Dial error — try the next scheme.
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(roles: Vec<Role>, state: ComponentState, kind: Option<&str>) -> StatusResponse {
        StatusResponse {
            roles,
            version: "0.1.0".into(),
            state,
            uptime_seconds: 1.0,
            agent_kind: kind.map(String::from),
            tier: None,
            current_task: None,
            config: serde_json::Value::Null,
        }
    }

    fn url(port: u16) -> String {
        format!("http://127.0.0.1:{port}")
    }

    // ── Eviction ────────────────────────────────────────────────────

    #[test]
    fn evicts_after_exactly_max_failures() {
        let cache = ComponentCache::new(3);
        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Idle, Some("claude")),
        );

        assert!(!cache.apply_failure(9000));
        assert!(!cache.apply_failure(9000));
        assert_eq!(cache.len(), 1, "still cached after 2 failures");
        assert!(cache.apply_failure(9000), "third failure evicts");
        assert!(cache.is_empty());
    }

    #[test]
    fn success_resets_failure_count() {
        let cache = ComponentCache::new(3);
        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Idle, None),
        );
        cache.apply_failure(9000);
        cache.apply_failure(9000);
        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Idle, None),
        );

        // Two more failures must not evict — the counter restarted.
        assert!(!cache.apply_failure(9000));
        assert!(!cache.apply_failure(9000));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failure_on_unknown_port_is_ignored() {
        let cache = ComponentCache::new(3);
        assert!(!cache.apply_failure(9999));
        assert!(cache.is_empty());
    }

    // ── Bucketing ───────────────────────────────────────────────────

    #[test]
    fn roles_bucket_agents_and_directors() {
        let cache = ComponentCache::new(3);
        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Idle, Some("claude")),
        );
        cache.apply_success(
            8800,
            url(8800),
            status(vec![Role::Director], ComponentState::Idle, None),
        );

        assert_eq!(cache.with_role(Role::Agent).len(), 1);
        assert_eq!(cache.with_role(Role::Director).len(), 1);
        assert_eq!(cache.all().len(), 2);
        assert!(cache.get(&url(8800)).is_some());
        assert!(cache.get("http://127.0.0.1:1").is_none());
    }

    // ── Idle-agent matching ─────────────────────────────────────────

    #[test]
    fn idle_agent_matches_kind_and_state() {
        let cache = ComponentCache::new(3);
        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Working, Some("claude")),
        );
        cache.apply_success(
            9001,
            url(9001),
            status(vec![Role::Agent], ComponentState::Idle, Some("codex")),
        );

        // Busy claude agent doesn't match.
        assert!(cache.idle_agent(Some("claude")).is_none());
        // Idle codex agent matches by kind, and with no kind constraint.
        assert_eq!(cache.idle_agent(Some("codex")).unwrap().url, url(9001));
        assert_eq!(cache.idle_agent(None).unwrap().url, url(9001));
        // Directors never match.
        cache.apply_success(
            8800,
            url(8800),
            status(vec![Role::Director], ComponentState::Idle, None),
        );
        assert_eq!(cache.idle_agent(None).unwrap().url, url(9001));
    }

    #[test]
    fn reclassification_updates_state() {
        let cache = ComponentCache::new(3);
        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Idle, Some("claude")),
        );
        assert!(cache.idle_agent(Some("claude")).is_some());

        cache.apply_success(
            9000,
            url(9000),
            status(vec![Role::Agent], ComponentState::Working, Some("claude")),
        );
        assert!(cache.idle_agent(Some("claude")).is_none());
    }
}
