//! Per-worktree session history: ordered `(title, commit hash)` entries.
//!
//! The store answers two questions for the checkpoint manager: what is the
//! latest title, and what was the previous *different* title. Commit hashes
//! are attached to entries after the corresponding commit lands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use catnip_core::title::TitleSource;

/// One recorded title for a worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub title: String,
    pub commit_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: TitleSource,
}

/// Append-only per-worktree title history.
#[derive(Default)]
pub struct SessionStore {
    entries: RwLock<HashMap<PathBuf, Vec<SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a title. Idempotent: offering the title that is already
    /// latest only refreshes its timestamp.
    pub fn record_title(&self, path: &Path, title: &str, source: TitleSource) {
        let mut entries = lock_write(&self.entries);
        let history = entries.entry(path.to_path_buf()).or_default();

        if let Some(last) = history.last_mut() {
            if last.title == title {
                last.timestamp = Utc::now();
                return;
            }
        }

        history.push(SessionEntry {
            title: title.to_string(),
            commit_hash: None,
            timestamp: Utc::now(),
            source,
        });
    }

    /// The most recently recorded title.
    pub fn latest_title(&self, path: &Path) -> Option<String> {
        lock_read(&self.entries)
            .get(path)
            .and_then(|history| history.last())
            .map(|entry| entry.title.clone())
    }

    /// The most recent title that differs from the latest one.
    pub fn previous_title(&self, path: &Path) -> Option<String> {
        let entries = lock_read(&self.entries);
        let history = entries.get(path)?;
        let latest = &history.last()?.title;
        history
            .iter()
            .rev()
            .find(|entry| entry.title != *latest)
            .map(|entry| entry.title.clone())
    }

    /// Attach a commit hash to the previous entry (the most recent one whose
    /// title differs from the latest). Idempotent.
    pub fn set_previous_commit_hash(&self, path: &Path, hash: &str) {
        let mut entries = lock_write(&self.entries);
        let Some(history) = entries.get_mut(path) else {
            return;
        };
        let Some(latest) = history.last().map(|e| e.title.clone()) else {
            return;
        };
        if let Some(entry) = history.iter_mut().rev().find(|e| e.title != latest) {
            entry.commit_hash = Some(hash.to_string());
        }
    }

    /// Attach a commit hash to the latest entry (checkpoint commits and the
    /// final flush at shutdown). Idempotent.
    pub fn set_latest_commit_hash(&self, path: &Path, hash: &str) {
        let mut entries = lock_write(&self.entries);
        if let Some(entry) = entries.get_mut(path).and_then(|h| h.last_mut()) {
            entry.commit_hash = Some(hash.to_string());
        }
    }

    /// Snapshot of the history for one worktree.
    pub fn entries(&self, path: &Path) -> Vec<SessionEntry> {
        lock_read(&self.entries).get(path).cloned().unwrap_or_default()
    }

    /// Drop the history for a deleted worktree.
    pub fn remove(&self, path: &Path) {
        lock_write(&self.entries).remove(path);
    }
}

fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WT: &str = "/workspace/foo/alpha";

    #[test]
    fn latest_and_previous_titles() {
        let store = SessionStore::new();
        let path = Path::new(WT);

        assert_eq!(store.latest_title(path), None);
        assert_eq!(store.previous_title(path), None);

        store.record_title(path, "Add login flow", TitleSource::Log);
        assert_eq!(store.latest_title(path).as_deref(), Some("Add login flow"));
        assert_eq!(store.previous_title(path), None);

        store.record_title(path, "Wire up session store", TitleSource::Log);
        assert_eq!(
            store.latest_title(path).as_deref(),
            Some("Wire up session store")
        );
        assert_eq!(store.previous_title(path).as_deref(), Some("Add login flow"));
    }

    #[test]
    fn duplicate_titles_collapse() {
        let store = SessionStore::new();
        let path = Path::new(WT);

        store.record_title(path, "Add login flow", TitleSource::Log);
        store.record_title(path, "Add login flow", TitleSource::Pty);
        assert_eq!(store.entries(path).len(), 1);
        // Source of the first observation wins.
        assert_eq!(store.entries(path)[0].source, TitleSource::Log);
    }

    #[test]
    fn previous_hash_lands_on_previous_entry() {
        let store = SessionStore::new();
        let path = Path::new(WT);

        store.record_title(path, "Add login flow", TitleSource::Log);
        store.record_title(path, "Wire up session store", TitleSource::Log);
        store.set_previous_commit_hash(path, "abc123");

        let entries = store.entries(path);
        assert_eq!(entries[0].commit_hash.as_deref(), Some("abc123"));
        assert_eq!(entries[1].commit_hash, None);
    }

    #[test]
    fn latest_hash_lands_on_latest_entry() {
        let store = SessionStore::new();
        let path = Path::new(WT);

        store.record_title(path, "Add login flow", TitleSource::Log);
        store.set_latest_commit_hash(path, "def456");

        let entries = store.entries(path);
        assert_eq!(entries[0].commit_hash.as_deref(), Some("def456"));
    }

    #[test]
    fn previous_skips_intervening_duplicates() {
        let store = SessionStore::new();
        let path = Path::new(WT);

        store.record_title(path, "A", TitleSource::Log);
        store.record_title(path, "B", TitleSource::Log);
        store.record_title(path, "B", TitleSource::Pty);
        assert_eq!(store.previous_title(path).as_deref(), Some("A"));
    }

    #[test]
    fn remove_clears_history() {
        let store = SessionStore::new();
        let path = Path::new(WT);
        store.record_title(path, "A", TitleSource::Log);
        store.remove(path);
        assert!(store.entries(path).is_empty());
    }
}
