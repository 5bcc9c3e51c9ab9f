//! On-disk journal of completed tasks.
//!
//! Each terminal task leaves an *outline* (`<task_id>.json`) and optionally
//! a raw stream *debug log* (`<task_id>.debug.log`) in the agent's history
//! directory. The two classes have independent retention caps; eviction is
//! oldest-first by `completed_at`. The in-memory index is rebuilt from disk
//! on startup so history survives restarts.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ag_domain::fsio::write_atomic;
use ag_domain::{Error, Result, Tier};
use ag_protocol::{prompt_preview, TaskError};

/// Default outline retention cap.
pub const MAX_OUTLINE: usize = 100;
/// Default debug-log retention cap.
pub const MAX_DEBUG_ENTRIES: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HistoryEntry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One completed task, as persisted in the outline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Terminal state: `completed`, `failed`, or `cancelled`.
    pub state: String,
    pub prompt: String,
    pub prompt_preview: String,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub has_debug_log: bool,
}

/// Listing options for [`HistoryStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// 1-based page number; 0 and 1 both mean the first page.
    pub page: usize,
    /// Page size; `None` returns everything on one page.
    pub limit: Option<usize>,
}

/// One page of history entries, newest `completed_at` first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HistoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HistoryStore {
    dir: PathBuf,
    max_outline: usize,
    max_debug: usize,
    index: Mutex<HashMap<String, HistoryEntry>>,
}

impl HistoryStore {
    /// Open (or create) the store at `dir` and rebuild the index from any
    /// outline files already present.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_caps(dir, MAX_OUTLINE, MAX_DEBUG_ENTRIES)
    }

    pub fn with_caps(
        dir: impl Into<PathBuf>,
        max_outline: usize,
        max_debug: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut index = HashMap::new();
        for dirent in std::fs::read_dir(&dir)? {
            let path = dirent?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|data| serde_json::from_str::<HistoryEntry>(&data).map_err(Error::from))
            {
                Ok(entry) => {
                    index.insert(entry.task_id.clone(), entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable history outline");
                }
            }
        }
        if !index.is_empty() {
            tracing::info!(count = index.len(), dir = %dir.display(), "loaded history index");
        }

        Ok(Self {
            dir,
            max_outline,
            max_debug,
            index: Mutex::new(index),
        })
    }

    /// Persist a terminal task. Derives `prompt_preview`, writes the outline
    /// atomically, then enforces the outline cap.
    pub fn save(&self, mut entry: HistoryEntry) -> Result<()> {
        validate_id(&entry.task_id)?;
        entry.prompt_preview = prompt_preview(&entry.prompt);

        let json = serde_json::to_vec_pretty(&entry)?;
        write_atomic(&self.outline_path(&entry.task_id), &json)?;

        let evict: Vec<String> = {
            let mut index = self.index.lock();
            index.insert(entry.task_id.clone(), entry);
            oldest_over_cap(&index, self.max_outline, |_| true)
        };
        for task_id in evict {
            self.remove_outline(&task_id);
        }
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Result<Option<HistoryEntry>> {
        validate_id(task_id)?;
        Ok(self.index.lock().get(task_id).cloned())
    }

    /// Write the raw stream log for a task and flag its outline, then
    /// enforce the debug-log cap.
    pub fn save_debug_log(&self, task_id: &str, bytes: &[u8]) -> Result<()> {
        validate_id(task_id)?;
        write_atomic(&self.debug_path(task_id), bytes)?;

        let evict: Vec<String> = {
            let mut index = self.index.lock();
            if let Some(entry) = index.get_mut(task_id) {
                entry.has_debug_log = true;
                let json = serde_json::to_vec_pretty(entry)?;
                write_atomic(&self.outline_path(task_id), &json)?;
            }
            oldest_over_cap(&index, self.max_debug, |e| e.has_debug_log)
        };
        for old in evict {
            self.remove_debug_log(&old)?;
        }
        Ok(())
    }

    pub fn get_debug_log(&self, task_id: &str) -> Result<Option<Vec<u8>>> {
        validate_id(task_id)?;
        match std::fs::read(self.debug_path(task_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List entries, newest `completed_at` first.
    pub fn list(&self, opts: &ListOptions) -> HistoryPage {
        let mut entries: Vec<HistoryEntry> = self.index.lock().values().cloned().collect();
        entries.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let total = entries.len();
        let limit = opts.limit.unwrap_or(usize::MAX).max(1);
        let page = opts.page.max(1);
        let total_pages = if total == 0 {
            0
        } else if opts.limit.is_none() {
            1
        } else {
            total.div_ceil(limit)
        };

        let entries = entries
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        HistoryPage {
            entries,
            total,
            page,
            total_pages,
        }
    }

    /// Number of outline entries currently retained.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    // ── internals ───────────────────────────────────────────────────

    fn outline_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    fn debug_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.debug.log"))
    }

    fn remove_outline(&self, task_id: &str) {
        self.index.lock().remove(task_id);
        for path in [self.outline_path(task_id), self.debug_path(task_id)] {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "history eviction failed");
                }
            }
        }
        tracing::debug!(task_id, "evicted history outline");
    }

    /// Delete a debug log but keep the outline, clearing its flag.
    fn remove_debug_log(&self, task_id: &str) -> Result<()> {
        if let Err(e) = std::fs::remove_file(self.debug_path(task_id)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        let mut index = self.index.lock();
        if let Some(entry) = index.get_mut(task_id) {
            entry.has_debug_log = false;
            let json = serde_json::to_vec_pretty(entry)?;
            write_atomic(&self.outline_path(task_id), &json)?;
        }
        tracing::debug!(task_id, "evicted history debug log");
        Ok(())
    }
}

/// Task ids become file names; anything path-like is rejected before it
/// reaches the filesystem.
fn validate_id(task_id: &str) -> Result<()> {
    if task_id.is_empty()
        || task_id.contains('/')
        || task_id.contains('\\')
        || task_id.contains("..")
    {
        return Err(Error::Validation(format!("invalid task id: {task_id:?}")));
    }
    Ok(())
}

/// Ids of entries (matching `filter`) past the cap, oldest `completed_at`
/// first.
fn oldest_over_cap(
    index: &HashMap<String, HistoryEntry>,
    cap: usize,
    filter: impl Fn(&HistoryEntry) -> bool,
) -> Vec<String> {
    let mut matching: Vec<(String, DateTime<Utc>)> = index
        .values()
        .filter(|e| filter(e))
        .map(|e| (e.task_id.clone(), e.completed_at))
        .collect();
    if matching.len() <= cap {
        return Vec::new();
    }
    matching.sort_by_key(|(_, at)| *at);
    let excess = matching.len() - cap;
    matching.into_iter().take(excess).map(|(id, _)| id).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn entry(task_id: &str, completed_minute: u32) -> HistoryEntry {
        HistoryEntry {
            task_id: task_id.into(),
            session_id: None,
            state: "completed".into(),
            prompt: format!("prompt for {task_id}"),
            prompt_preview: String::new(),
            tier: Tier::Standard,
            started_at: None,
            completed_at: Utc
                .with_ymd_and_hms(2026, 1, 1, completed_minute / 60, completed_minute % 60, 0)
                .unwrap(),
            duration_seconds: 1.5,
            output: "ok".into(),
            error: None,
            has_debug_log: false,
        }
    }

    fn store(dir: &std::path::Path) -> HistoryStore {
        HistoryStore::open(dir).unwrap()
    }

    // ── Save / get ──────────────────────────────────────────────────

    #[test]
    fn save_derives_preview() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut e = entry("t1", 0);
        e.prompt = "y".repeat(300);
        store.save(e).unwrap();

        let got = store.get("t1").unwrap().unwrap();
        assert!(got.prompt_preview.ends_with("..."));
        assert_eq!(got.prompt_preview.len(), 203);
    }

    #[test]
    fn get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(dir.path()).get("nope").unwrap().is_none());
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for bad in ["../etc", "a/b", "a\\b", "..", ""] {
            assert!(store.get(bad).is_err(), "id {bad:?} must be rejected");
            assert!(store.save_debug_log(bad, b"x").is_err());
        }
        // Nothing escaped onto disk.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store(dir.path());
            store.save(entry("t1", 0)).unwrap();
            store.save(entry("t2", 1)).unwrap();
        }
        let reopened = store(dir.path());
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("t2").unwrap().unwrap().output, "ok");
    }

    // ── Retention ───────────────────────────────────────────────────

    #[test]
    fn outline_cap_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::with_caps(dir.path(), 100, 20).unwrap();

        for i in 0..105u32 {
            store.save(entry(&format!("t{i}"), i)).unwrap();
        }

        let page = store.list(&ListOptions { page: 1, limit: Some(200) });
        assert_eq!(page.total, 100);
        // The five smallest completed_at are gone.
        for i in 0..5u32 {
            assert!(store.get(&format!("t{i}")).unwrap().is_none());
        }
        assert!(store.get("t5").unwrap().is_some());
        assert!(!dir.path().join("t0.json").exists());
    }

    #[test]
    fn debug_cap_clears_flag_but_keeps_outline() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::with_caps(dir.path(), 100, 3).unwrap();

        for i in 0..5u32 {
            let id = format!("t{i}");
            store.save(entry(&id, i)).unwrap();
            store.save_debug_log(&id, b"raw stream").unwrap();
        }

        // Oldest two logs evicted, outlines preserved with the flag down.
        for i in 0..2u32 {
            let id = format!("t{i}");
            assert!(store.get_debug_log(&id).unwrap().is_none());
            let e = store.get(&id).unwrap().unwrap();
            assert!(!e.has_debug_log);
        }
        for i in 2..5u32 {
            let id = format!("t{i}");
            assert!(store.get_debug_log(&id).unwrap().is_some());
            assert!(store.get(&id).unwrap().unwrap().has_debug_log);
        }
    }

    #[test]
    fn outline_eviction_takes_debug_log_with_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::with_caps(dir.path(), 2, 20).unwrap();

        store.save(entry("t0", 0)).unwrap();
        store.save_debug_log("t0", b"log").unwrap();
        store.save(entry("t1", 1)).unwrap();
        store.save(entry("t2", 2)).unwrap();

        assert!(store.get("t0").unwrap().is_none());
        assert!(store.get_debug_log("t0").unwrap().is_none());
    }

    // ── Listing ─────────────────────────────────────────────────────

    #[test]
    fn list_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save(entry("old", 0)).unwrap();
        store.save(entry("new", 30)).unwrap();

        let page = store.list(&ListOptions::default());
        assert_eq!(page.entries[0].task_id, "new");
        assert_eq!(page.entries[1].task_id, "old");
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn list_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for i in 0..5u32 {
            store.save(entry(&format!("t{i}"), i)).unwrap();
        }

        let p1 = store.list(&ListOptions { page: 1, limit: Some(2) });
        assert_eq!(p1.total, 5);
        assert_eq!(p1.total_pages, 3);
        assert_eq!(p1.entries.len(), 2);
        assert_eq!(p1.entries[0].task_id, "t4");

        let p3 = store.list(&ListOptions { page: 3, limit: Some(2) });
        assert_eq!(p3.entries.len(), 1);
        assert_eq!(p3.entries[0].task_id, "t0");

        let past = store.list(&ListOptions { page: 9, limit: Some(2) });
        assert!(past.entries.is_empty());
    }

    #[test]
    fn list_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let page = store(dir.path()).list(&ListOptions::default());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.entries.is_empty());
    }

    // ── Properties ──────────────────────────────────────────────────

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// After any save sequence the caps hold and the survivors are the
        /// entries with the largest `completed_at`.
        #[test]
        fn retention_bounds_hold(count in 1usize..40, cap in 1usize..10) {
            let dir = tempfile::tempdir().unwrap();
            let store = HistoryStore::with_caps(dir.path(), cap, cap).unwrap();

            for i in 0..count {
                store.save(entry(&format!("t{i}"), i as u32)).unwrap();
            }

            prop_assert!(store.len() <= cap);
            let expect_evicted = count.saturating_sub(cap);
            for i in 0..expect_evicted {
                let key = format!("t{}", i);
                let found = store.get(&key).unwrap().is_none();
                prop_assert!(found);
            }
            for i in expect_evicted..count {
                let key = format!("t{}", i);
                let found = store.get(&key).unwrap().is_some();
                prop_assert!(found);
            }
        }
    }
}
