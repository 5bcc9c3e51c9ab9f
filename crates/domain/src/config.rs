//! Environment configuration shared by every fleet binary.
//!
//! Components are configured from the environment plus per-binary CLI
//! flags; the only config *file* in the fleet is the scheduler's YAML job
//! list, which lives in `ag-scheduler`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// `AGENCY_ROOT` — root directory for all persisted state.
pub const ENV_ROOT: &str = "AGENCY_ROOT";
/// `AGENCY_MODE` — `prod` (JSON logs) or `dev` (compact logs).
pub const ENV_MODE: &str = "AGENCY_MODE";
/// `AG_WEB_PASSWORD` — director API password; unset disables the filter.
pub const ENV_WEB_PASSWORD: &str = "AG_WEB_PASSWORD";
/// `AG_SCHEDULER_CONFIG_RELOAD_INTERVAL` — Go-style duration, default 60s.
pub const ENV_SCHEDULER_RELOAD: &str = "AG_SCHEDULER_CONFIG_RELOAD_INTERVAL";

/// Discovery probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
/// Status read timeout for direct component reads.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
/// Queue submission timeout.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Graceful shutdown budget for the director.
pub const SHUTDOWN_DIRECTOR: Duration = Duration::from_secs(10);
/// Graceful shutdown budget for agents and the scheduler.
pub const SHUTDOWN_AGENT: Duration = Duration::from_secs(30);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Prod,
    Dev,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(ENV_MODE).as_deref() {
            Ok("dev") => Mode::Dev,
            _ => Mode::Prod,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgencyEnv
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolved environment shared by every binary.
#[derive(Debug, Clone)]
pub struct AgencyEnv {
    /// Root for persisted state (`history/`, queue snapshots, sessions).
    pub root: PathBuf,
    pub mode: Mode,
}

impl AgencyEnv {
    /// Read `AGENCY_ROOT` / `AGENCY_MODE`, defaulting the root to
    /// `~/.agency`.
    pub fn load() -> Result<Self> {
        let root = match std::env::var(ENV_ROOT) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => dirs::home_dir()
                .ok_or_else(|| Error::Config("cannot resolve home directory".into()))?
                .join(".agency"),
        };
        Ok(Self {
            root,
            mode: Mode::from_env(),
        })
    }

    /// History directory for a named agent.
    pub fn history_dir(&self, agent_name: &str) -> PathBuf {
        self.root.join("history").join(agent_name)
    }

    /// Session working-directory base for a named agent.
    pub fn session_base(&self, agent_name: &str) -> PathBuf {
        self.root.join("sessions").join(agent_name)
    }

    /// Queue snapshot directory.
    pub fn queue_dir(&self) -> PathBuf {
        self.root.join("queue")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Go-style durations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a Go-style duration string (`"500ms"`, `"90s"`, `"1m30s"`, `"2h"`).
///
/// Units: `ms`, `s`, `m`, `h`. Segments concatenate and accumulate. A bare
/// number is rejected, matching Go's `time.ParseDuration`.
pub fn parse_go_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("empty duration".into()));
    }

    let mut total = Duration::ZERO;
    let mut chars = s.chars().peekable();
    let mut seen_segment = false;

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(Error::Config(format!("invalid duration: {s:?}")));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| Error::Config(format!("invalid duration: {s:?}")))?;

        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        let step = match unit.as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(Error::Config(format!("invalid duration unit in {s:?}"))),
        };
        total += step;
        seen_segment = true;
    }

    if !seen_segment {
        return Err(Error::Config(format!("invalid duration: {s:?}")));
    }
    Ok(total)
}

/// Scheduler config reload interval from the environment.
///
/// Default 60 s; values below the 1 s floor are clamped up.
pub fn scheduler_reload_interval() -> Duration {
    let configured = std::env::var(ENV_SCHEDULER_RELOAD)
        .ok()
        .and_then(|v| match parse_go_duration(&v) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(value = %v, error = %e, "ignoring bad reload interval");
                None
            }
        })
        .unwrap_or(Duration::from_secs(60));
    configured.max(Duration::from_secs(1))
}
