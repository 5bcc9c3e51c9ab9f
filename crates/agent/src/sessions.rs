//! Session working directories.
//!
//! A session is a reusable working directory keyed by an opaque id. Ids are
//! gated by a strict character class, and the resolved path is re-checked
//! against the base directory before anything touches the filesystem. A
//! session is locked while a task for it is non-terminal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;

use ag_domain::{Error, Result};

/// `^[A-Za-z0-9_-]{1,64}$`
fn session_id_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"))
}

/// Validate a session id against the character-class gate.
pub fn validate_session_id(id: &str) -> Result<()> {
    if session_id_re().is_match(id) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid session id: {id:?}")))
    }
}

pub struct SessionManager {
    base: PathBuf,
    locked: Mutex<HashSet<String>>,
}

impl SessionManager {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)?;
        Ok(Self {
            base,
            locked: Mutex::new(HashSet::new()),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a session id to its working directory without creating it.
    ///
    /// The id gate already excludes separators and dots, but the containment
    /// check runs anyway: a resolved path outside the base is rejected.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        validate_session_id(id)?;
        let dir = self.base.join(id);
        if !dir.starts_with(&self.base) {
            return Err(Error::Validation(format!(
                "session path escapes the base directory: {id:?}"
            )));
        }
        Ok(dir)
    }

    /// Resolve and create the working directory for a task.
    pub fn ensure_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.resolve(id)?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Mark a session busy for the lifetime of one task. Fails if a task
    /// for the session is already non-terminal.
    pub fn lock(&self, id: &str) -> Result<()> {
        let mut locked = self.locked.lock();
        if !locked.insert(id.to_string()) {
            return Err(Error::AgentBusy);
        }
        Ok(())
    }

    pub fn unlock(&self, id: &str) {
        self.locked.lock().remove(id);
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.locked.lock().contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        for ok in ["abc", "A-1_b", "x", &"y".repeat(64)] {
            assert!(validate_session_id(ok).is_ok(), "{ok:?} should pass");
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        let too_long = "z".repeat(65);
        for bad in ["", "../etc", "a/b", "a b", "a.b", "é", too_long.as_str()] {
            assert!(validate_session_id(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn rejected_ids_never_reach_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path().join("base")).unwrap();

        assert!(sessions.ensure_dir("../escape").is_err());
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn resolve_stays_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path()).unwrap();
        let resolved = sessions.resolve("sess-1").unwrap();
        assert!(resolved.starts_with(dir.path()));
        assert_eq!(resolved.file_name().unwrap(), "sess-1");
    }

    #[test]
    fn same_id_resumes_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path()).unwrap();
        let first = sessions.ensure_dir("resume-me").unwrap();
        std::fs::write(first.join("marker"), b"x").unwrap();

        let second = sessions.ensure_dir("resume-me").unwrap();
        assert_eq!(first, second);
        assert!(second.join("marker").exists());
    }

    #[test]
    fn lock_is_exclusive_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path()).unwrap();

        sessions.lock("s1").unwrap();
        assert!(sessions.lock("s1").is_err());
        assert!(sessions.is_locked("s1"));
        // Other sessions are unaffected.
        sessions.lock("s2").unwrap();

        sessions.unlock("s1");
        sessions.lock("s1").unwrap();
    }
}
