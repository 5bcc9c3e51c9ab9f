//! Scheduler YAML configuration.
//!
//! ```yaml
//! jobs:
//!   - name: nightly-triage
//!     cron: "0 3 * * *"
//!     target: "http://127.0.0.1:8700"
//!     agent_kind: claude
//!     tier: standard
//!     prompt: "Triage the open issues."
//!     timeout_seconds: 1800
//! ```
//!
//! A config that fails to parse — YAML or any cron expression — is fatal
//! at startup; reload failures keep the previous job set.

use std::path::Path;

use serde::Deserialize;

use ag_cron::CronExpr;
use ag_domain::{Error, Result, Tier};

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub cron: String,
    /// Director (preferred) or agent base URL.
    pub target: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub agent_kind: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config: SchedulerConfig = serde_yaml::from_str(&data)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Every job needs a unique name and a parseable cron expression.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(Error::Config("job with empty name".into()));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(Error::Config(format!("duplicate job name: {}", job.name)));
            }
            if job.prompt.trim().is_empty() {
                return Err(Error::Config(format!("job {}: empty prompt", job.name)));
            }
            if job.target.trim().is_empty() {
                return Err(Error::Config(format!("job {}: empty target", job.name)));
            }
            CronExpr::parse(&job.cron)
                .map_err(|e| Error::Config(format!("job {}: {e}", job.name)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(yaml: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.yaml");
        std::fs::write(&path, yaml).unwrap();
        (dir, path)
    }

    #[test]
    fn parses_a_full_job() {
        let (_dir, path) = write_config(
            r#"
jobs:
  - name: nightly
    cron: "0 3 * * *"
    target: "http://127.0.0.1:8700"
    agent_kind: claude
    tier: heavy
    prompt: "Do the nightly run."
    timeout_seconds: 1800
"#,
        );
        let config = SchedulerConfig::load(&path).unwrap();
        assert_eq!(config.jobs.len(), 1);
        let job = &config.jobs[0];
        assert_eq!(job.name, "nightly");
        assert_eq!(job.tier, Some(Tier::Heavy));
        assert!(job.enabled);
    }

    #[test]
    fn enabled_defaults_to_true_and_can_be_off() {
        let (_dir, path) = write_config(
            r#"
jobs:
  - name: a
    cron: "* * * * *"
    target: "http://x"
    prompt: "p"
  - name: b
    cron: "* * * * *"
    target: "http://x"
    prompt: "p"
    enabled: false
"#,
        );
        let config = SchedulerConfig::load(&path).unwrap();
        assert!(config.jobs[0].enabled);
        assert!(!config.jobs[1].enabled);
    }

    #[test]
    fn rejects_bad_cron() {
        let (_dir, path) = write_config(
            r#"
jobs:
  - name: broken
    cron: "99 * * * *"
    target: "http://x"
    prompt: "p"
"#,
        );
        assert!(SchedulerConfig::load(&path).is_err());
    }

    #[test]
    fn rejects_duplicate_names_and_empty_fields() {
        let (_dir, path) = write_config(
            r#"
jobs:
  - name: twin
    cron: "* * * * *"
    target: "http://x"
    prompt: "p"
  - name: twin
    cron: "* * * * *"
    target: "http://x"
    prompt: "p"
"#,
        );
        assert!(SchedulerConfig::load(&path).is_err());

        let (_dir, path) = write_config(
            r#"
jobs:
  - name: noprompt
    cron: "* * * * *"
    target: "http://x"
    prompt: ""
"#,
        );
        assert!(SchedulerConfig::load(&path).is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchedulerConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
