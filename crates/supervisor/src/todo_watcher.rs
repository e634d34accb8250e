//! Session transcript watcher: mirrors the agent's task list into the
//! registry.
//!
//! Only writes to `.jsonl` transcript files count. The worktree identity is
//! decoded from the transcript's directory name, and a size map drops the
//! duplicate events a single logical write produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use catnip_core::paths::worktree_path_for_transcript;
use catnip_core::todos::latest_todos;

use crate::registry::{WorktreePatch, WorktreeRegistry};

/// Processes transcript file events into registry todo updates.
pub struct TodoWatcher {
    projects_dir: PathBuf,
    registry: Arc<WorktreeRegistry>,
    /// Last observed size per transcript file, for burst dedup.
    sizes: Mutex<HashMap<PathBuf, u64>>,
}

impl TodoWatcher {
    pub fn new(projects_dir: impl Into<PathBuf>, registry: Arc<WorktreeRegistry>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            registry,
            sizes: Mutex::new(HashMap::new()),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Handle one modification event on a transcript file.
    pub async fn handle_transcript_event(&self, transcript: &Path) {
        let Some(worktree_path) = worktree_path_for_transcript(transcript) else {
            return;
        };

        // fsnotify bursts: a logical write arrives as several events. Skip
        // when the file size has not moved since the last one.
        if let Ok(metadata) = std::fs::metadata(transcript) {
            let size = metadata.len();
            let mut sizes = lock(&self.sizes);
            if sizes.get(transcript) == Some(&size) {
                return;
            }
            sizes.insert(transcript.to_path_buf(), size);
        }

        let projects_dir = self.projects_dir.clone();
        let parse_path = worktree_path.clone();
        let todos = match tokio::task::spawn_blocking(move || {
            latest_todos(&projects_dir, &parse_path)
        })
        .await
        {
            Ok(todos) => todos,
            Err(err) => {
                warn!(error = %err, "transcript parse task failed");
                return;
            }
        };

        let Some(worktree) = self.registry.find_by_path(&worktree_path) else {
            debug!(
                worktree = %worktree_path.display(),
                "transcript update for unregistered worktree"
            );
            return;
        };

        let count = todos.len();
        if self.registry.update_worktree(
            &worktree.id,
            WorktreePatch {
                todos: Some(todos),
                ..Default::default()
            },
        ) {
            info!(
                worktree = %worktree_path.display(),
                todos = count,
                "updated worktree todos"
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
