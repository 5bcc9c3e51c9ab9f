//! The live job set: merge-on-reload, due evaluation, and fire bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use ag_cron::CronExpr;
use ag_domain::Tier;

use crate::config::{JobConfig, SchedulerConfig};

/// One scheduled job with its runtime state.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub expr: CronExpr,
    pub target: String,
    pub tier: Option<Tier>,
    pub agent_kind: Option<String>,
    pub prompt: String,
    pub timeout_seconds: Option<u64>,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    /// Next trigger; `> now` whenever the job is enabled.
    pub next_run: Option<DateTime<Utc>>,
    /// Failure of the most recent fire attempt; cleared on success.
    pub last_error: Option<String>,
}

/// Summary for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub cron: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// All jobs, keyed by name.
#[derive(Default)]
pub struct JobSet {
    jobs: HashMap<String, Job>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a (re)loaded config. Jobs matched by name keep their
    /// `last_run` and `last_error`; new jobs schedule from `now`; jobs
    /// missing from the config are dropped. Missed ticks are never
    /// backfilled — `next_run` always moves to the next future match.
    pub fn apply_config(&mut self, config: &SchedulerConfig, now: DateTime<Utc>) {
        let mut next: HashMap<String, Job> = HashMap::new();
        for job_config in &config.jobs {
            let Ok(expr) = CronExpr::parse(&job_config.cron) else {
                // Validated at load; a bad expression here means the caller
                // skipped validation, so skip the job rather than panic.
                tracing::warn!(job = %job_config.name, "skipping job with bad cron");
                continue;
            };
            let previous = self.jobs.get(&job_config.name);
            let next_run = if job_config.enabled {
                expr.next_after(&now)
            } else {
                None
            };
            next.insert(
                job_config.name.clone(),
                Job {
                    name: job_config.name.clone(),
                    expr,
                    target: job_config.target.clone(),
                    tier: job_config.tier,
                    agent_kind: job_config.agent_kind.clone(),
                    prompt: job_config.prompt.clone(),
                    timeout_seconds: job_config.timeout_seconds,
                    enabled: job_config.enabled,
                    last_run: previous.and_then(|p| p.last_run),
                    next_run,
                    last_error: previous.and_then(|p| p.last_error.clone()),
                },
            );
        }

        let dropped: Vec<&String> = self
            .jobs
            .keys()
            .filter(|name| !next.contains_key(*name))
            .collect();
        if !dropped.is_empty() {
            tracing::info!(?dropped, "jobs removed by config reload");
        }
        self.jobs = next;
    }

    /// Enabled jobs whose `next_run` has arrived.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.jobs
            .values()
            .filter(|j| j.enabled && j.next_run.map_or(false, |next| next <= now))
            .cloned()
            .collect()
    }

    /// Record a fire attempt: stamp `last_run` and advance `next_run`
    /// strictly past `now`, so a job never double-fires within a minute.
    pub fn record_fired(&mut self, name: &str, now: DateTime<Utc>) {
        if let Some(job) = self.jobs.get_mut(name) {
            job.last_run = Some(now);
            job.next_run = job.expr.next_after(&now);
        }
    }

    /// Record the fire outcome.
    pub fn record_outcome(&mut self, name: &str, error: Option<String>) {
        if let Some(job) = self.jobs.get_mut(name) {
            if let Some(ref message) = error {
                tracing::warn!(job = %name, error = %message, "job dispatch failed");
            }
            job.last_error = error;
        }
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .jobs
            .values()
            .map(|j| JobSummary {
                name: j.name.clone(),
                cron: j.expr.source().to_string(),
                enabled: j.enabled,
                last_run: j.last_run,
                next_run: j.next_run,
                last_error: j.last_error.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }
}
