//! In-memory registry of repositories and worktrees with a crash-safe JSON
//! snapshot.
//!
//! The registry is the only durable shared structure: all reads and writes
//! go through its lock, and every committed mutation schedules a best-effort
//! snapshot write that never blocks the mutator. Worktrees reference their
//! owning repository by id, never by handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use catnip_core::todos::TodoItem;

/// A checked-out or mounted repository.
///
/// Identity is `{host-namespace}/{name}`, with the synthetic `local/<dir>`
/// prefix for mounted local repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    #[serde(default)]
    pub url: String,
    pub path: PathBuf,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_accessed: DateTime<Utc>,
}

impl Repository {
    /// Whether this repository was mounted from the local machine.
    pub fn is_local(&self) -> bool {
        self.id.starts_with("local/")
    }
}

/// One git worktree under supervision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worktree {
    pub id: String,
    pub repo_id: String,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub commit_count: u64,
    #[serde(default)]
    pub commits_behind: u64,
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default)]
    pub has_conflicts: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
}

/// Partial update applied atomically to one worktree.
#[derive(Debug, Clone, Default)]
pub struct WorktreePatch {
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub commit_count: Option<u64>,
    pub commits_behind: Option<u64>,
    pub is_dirty: Option<bool>,
    pub has_conflicts: Option<bool>,
    pub todos: Option<Vec<TodoItem>>,
    pub last_accessed: Option<DateTime<Utc>>,
}

/// The persisted shape. `BTreeMap` keeps snapshot key ordering stable.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    repositories: BTreeMap<String, Repository>,
    worktrees: BTreeMap<String, Worktree>,
}

/// On-disk snapshot, accepting both the current multi-repository shape and
/// the legacy single-repository shape.
#[derive(Debug, Deserialize)]
struct SnapshotOnDisk {
    #[serde(default)]
    repositories: Option<BTreeMap<String, Repository>>,
    /// Legacy single-repo field, promoted to `repositories` on load.
    #[serde(default)]
    repository: Option<Repository>,
    #[serde(default)]
    worktrees: Option<BTreeMap<String, Worktree>>,
}

/// Registry of repositories and worktrees behind one readers-writer lock.
pub struct WorktreeRegistry {
    state: RwLock<RegistryState>,
    state_path: PathBuf,
}

impl WorktreeRegistry {
    /// Create an empty registry persisting to `state_path`.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            state_path: state_path.into(),
        }
    }

    /// Load the snapshot from disk, migrating the legacy single-repo shape.
    /// A missing file yields an empty registry; a corrupt file is logged and
    /// treated as empty (in-memory state is authoritative from then on).
    pub fn load(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let registry = Self::new(state_path.clone());

        let data = match std::fs::read_to_string(&state_path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return registry,
            Err(err) => {
                warn!(path = %state_path.display(), error = %err, "failed to read state snapshot");
                return registry;
            }
        };

        let snapshot: SnapshotOnDisk = match serde_json::from_str(&data) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %state_path.display(), error = %err, "failed to parse state snapshot");
                return registry;
            }
        };

        let mut repositories = snapshot.repositories.unwrap_or_default();
        if let Some(repo) = snapshot.repository {
            debug!(repo = %repo.id, "migrating legacy single-repository snapshot");
            repositories.insert(repo.id.clone(), repo);
        }

        {
            let mut state = lock_write(&registry.state);
            state.repositories = repositories;
            state.worktrees = snapshot.worktrees.unwrap_or_default();
        }
        registry
    }

    pub fn insert_repository(&self, repo: Repository) {
        {
            let mut state = lock_write(&self.state);
            state.repositories.insert(repo.id.clone(), repo);
        }
        self.schedule_snapshot();
    }

    pub fn insert_worktree(&self, worktree: Worktree) {
        {
            let mut state = lock_write(&self.state);
            state.worktrees.insert(worktree.id.clone(), worktree);
        }
        self.schedule_snapshot();
    }

    /// Apply a patch to one worktree. Returns false when the id is unknown
    /// (e.g. the worktree was deleted while an update was in flight).
    pub fn update_worktree(&self, id: &str, patch: WorktreePatch) -> bool {
        let updated = {
            let mut state = lock_write(&self.state);
            match state.worktrees.get_mut(id) {
                Some(worktree) => {
                    apply_patch(worktree, patch);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.schedule_snapshot();
        }
        updated
    }

    pub fn delete_worktree(&self, id: &str) -> Option<Worktree> {
        let removed = {
            let mut state = lock_write(&self.state);
            state.worktrees.remove(id)
        };
        if removed.is_some() {
            self.schedule_snapshot();
        }
        removed
    }

    pub fn get_worktree(&self, id: &str) -> Option<Worktree> {
        lock_read(&self.state).worktrees.get(id).cloned()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<Worktree> {
        lock_read(&self.state)
            .worktrees
            .values()
            .find(|w| w.path == path)
            .cloned()
    }

    pub fn get_all_worktrees(&self) -> Vec<Worktree> {
        lock_read(&self.state).worktrees.values().cloned().collect()
    }

    pub fn get_repository(&self, id: &str) -> Option<Repository> {
        lock_read(&self.state).repositories.get(id).cloned()
    }

    pub fn repositories(&self) -> Vec<Repository> {
        lock_read(&self.state)
            .repositories
            .values()
            .cloned()
            .collect()
    }

    /// Owning repository of a worktree, resolved via its `repo_id`.
    pub fn repository_for(&self, worktree: &Worktree) -> Option<Repository> {
        self.get_repository(&worktree.repo_id)
    }

    /// Serialize the current state with stable key ordering.
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        let state = lock_read(&self.state);
        serde_json::to_string_pretty(&*state)
    }

    /// Write the snapshot synchronously. Used at shutdown and by tests; the
    /// mutation path goes through [`Self::schedule_snapshot`].
    pub fn save_now(&self) -> std::io::Result<()> {
        let json = self
            .snapshot_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.state_path, json)
    }

    /// Schedule a best-effort snapshot write. Serialization happens under a
    /// read lock; the write itself runs on the runtime when one is present,
    /// synchronously otherwise. Failures are logged, never propagated.
    fn schedule_snapshot(&self) {
        let json = match self.snapshot_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize state snapshot");
                return;
            }
        };
        let path = self.state_path.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = write_snapshot(&path, &json).await {
                        warn!(path = %path.display(), error = %err, "failed to write state snapshot");
                    }
                });
            }
            Err(_) => {
                if let Err(err) = write_snapshot_sync(&path, &json) {
                    warn!(path = %path.display(), error = %err, "failed to write state snapshot");
                }
            }
        }
    }
}

async fn write_snapshot(path: &Path, json: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await
}

fn write_snapshot_sync(path: &Path, json: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)
}

fn apply_patch(worktree: &mut Worktree, patch: WorktreePatch) {
    if let Some(branch) = patch.branch {
        worktree.branch = branch;
    }
    if let Some(commit_hash) = patch.commit_hash {
        worktree.commit_hash = commit_hash;
    }
    if let Some(commit_count) = patch.commit_count {
        worktree.commit_count = commit_count;
    }
    if let Some(commits_behind) = patch.commits_behind {
        worktree.commits_behind = commits_behind;
    }
    if let Some(is_dirty) = patch.is_dirty {
        worktree.is_dirty = is_dirty;
    }
    if let Some(has_conflicts) = patch.has_conflicts {
        worktree.has_conflicts = has_conflicts;
    }
    if let Some(todos) = patch.todos {
        worktree.todos = todos;
    }
    if let Some(last_accessed) = patch.last_accessed {
        worktree.last_accessed = last_accessed;
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

    fn sample_worktree(id: &str, path: &str) -> Worktree {
        let now = Utc::now();
        Worktree {
            id: id.to_string(),
            repo_id: "local/foo".to_string(),
            name: "lively-otter".to_string(),
            path: PathBuf::from(path),
            branch: "catnip/lively-otter".to_string(),
            source_branch: "main".to_string(),
            commit_hash: String::new(),
            commit_count: 0,
            commits_behind: 0,
            is_dirty: false,
            has_conflicts: false,
            created_at: now,
            last_accessed: now,
            todos: Vec::new(),
        }
    }

    fn sample_repository() -> Repository {
        let now = Utc::now();
        Repository {
            id: "local/foo".to_string(),
            url: "file:///live/foo".to_string(),
            path: PathBuf::from("/live/foo"),
            default_branch: "main".to_string(),
            created_at: now,
            last_accessed: now,
        }
    }

    #[test]
    fn update_patches_only_named_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::new(tmp.path().join("state.json"));
        registry.insert_worktree(sample_worktree("wt-1", "/workspace/foo/alpha"));

        let updated = registry.update_worktree(
            "wt-1",
            WorktreePatch {
                branch: Some("feature/login-flow".to_string()),
                commit_count: Some(3),
                ..Default::default()
            },
        );
        assert!(updated);

        let worktree = registry.get_worktree("wt-1").unwrap();
        assert_eq!(worktree.branch, "feature/login-flow");
        assert_eq!(worktree.commit_count, 3);
        assert_eq!(worktree.source_branch, "main");

        assert!(!registry.update_worktree("missing", WorktreePatch::default()));
    }

    #[test]
    fn find_by_path_and_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::new(tmp.path().join("state.json"));
        registry.insert_worktree(sample_worktree("wt-1", "/workspace/foo/alpha"));

        let found = registry.find_by_path(Path::new("/workspace/foo/alpha"));
        assert_eq!(found.map(|w| w.id), Some("wt-1".to_string()));
        assert!(registry.find_by_path(Path::new("/workspace/other")).is_none());

        assert!(registry.delete_worktree("wt-1").is_some());
        assert!(registry.get_worktree("wt-1").is_none());
    }

    #[test]
    fn snapshot_round_trip_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");

        let registry = WorktreeRegistry::new(&path);
        registry.insert_repository(sample_repository());
        registry.insert_worktree(sample_worktree("wt-1", "/workspace/foo/alpha"));
        registry.insert_worktree(sample_worktree("wt-2", "/workspace/foo/beta"));
        registry.save_now().unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let reloaded = WorktreeRegistry::load(&path);
        assert_eq!(reloaded.get_all_worktrees().len(), 2);
        assert_eq!(reloaded.repositories().len(), 1);
        reloaded.save_now().unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn legacy_single_repo_snapshot_is_migrated() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let legacy = serde_json::json!({
            "repository": {
                "id": "vanpelt/catnip",
                "url": "https://github.com/vanpelt/catnip.git",
                "path": "/workspace/catnip.git",
                "default_branch": "main",
                "created_at": "2024-01-01T00:00:00Z",
                "last_accessed": "2024-01-01T00:00:00Z"
            },
            "worktrees": {
                "wt-1": {
                    "id": "wt-1",
                    "repo_id": "vanpelt/catnip",
                    "path": "/workspace/catnip/coal"
                }
            }
        });
        std::fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let registry = WorktreeRegistry::load(&path);
        let repo = registry.get_repository("vanpelt/catnip").unwrap();
        assert_eq!(repo.default_branch, "main");
        assert!(!repo.is_local());

        // Missing worktree fields default.
        let worktree = registry.get_worktree("wt-1").unwrap();
        assert_eq!(worktree.branch, "");
        assert_eq!(worktree.commit_count, 0);
        assert!(worktree.todos.is_empty());
        assert_eq!(registry.repository_for(&worktree).unwrap().id, repo.id);
    }

    #[test]
    fn unknown_fields_are_ignored_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"repositories": {}, "worktrees": {}, "activeWorktree": "gone"}"#,
        )
        .unwrap();

        let registry = WorktreeRegistry::load(&path);
        assert!(registry.get_all_worktrees().is_empty());
    }

    #[test]
    fn missing_snapshot_yields_empty_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::load(tmp.path().join("absent.json"));
        assert!(registry.get_all_worktrees().is_empty());
        assert!(registry.repositories().is_empty());
    }
}
