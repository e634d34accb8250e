//! Per-worktree checkpoint state machine.
//!
//! One manager exists per worktree path for as long as the path is under
//! supervision. A title change commits the previous title's work and resets
//! the debounce timer; a timer fire checkpoints a dirty tree and
//! reschedules; stop flushes pending work. Timer invalidation uses a
//! generation counter: every title change (and stop) bumps the generation,
//! and a waking timer task re-locks, re-reads, and exits when its
//! generation is stale.
//!
//! Locking: the state mutex is never held across I/O. Git mutations (commit
//! and graduation rename) serialize on a separate per-manager async lock so
//! a checkpoint commit is never concurrent with a rename of the same
//! worktree.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use catnip_core::llm::CompletionClient;
use catnip_core::title::TitleSource;
use catnip_git::names::is_scratch_branch;
use catnip_git::ops;

use crate::graduate::{self, GraduateError};
use crate::registry::WorktreeRegistry;
use crate::session::SessionStore;
use crate::status::refresh_worktree_status;
use crate::tasks::spawn_supervised;

#[derive(Default)]
struct ManagerState {
    current_title: Option<String>,
    timer_generation: u64,
    renaming_in_progress: bool,
    stopped: bool,
}

/// Checkpoint manager for a single worktree.
pub struct CheckpointManager {
    worktree_path: PathBuf,
    checkpoint_interval: Duration,
    llm_timeout: Duration,
    registry: Arc<WorktreeRegistry>,
    sessions: Arc<SessionStore>,
    llm: Arc<dyn CompletionClient>,
    state: Mutex<ManagerState>,
    /// Serializes git mutations: checkpoint commits and graduation renames.
    git_lock: tokio::sync::Mutex<()>,
}

impl CheckpointManager {
    pub fn new(
        worktree_path: impl Into<PathBuf>,
        checkpoint_interval: Duration,
        llm_timeout: Duration,
        registry: Arc<WorktreeRegistry>,
        sessions: Arc<SessionStore>,
        llm: Arc<dyn CompletionClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            worktree_path: worktree_path.into(),
            checkpoint_interval,
            llm_timeout,
            registry,
            sessions,
            llm,
            state: Mutex::new(ManagerState::default()),
            git_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    pub fn current_title(&self) -> Option<String> {
        lock(&self.state).current_title.clone()
    }

    /// Process a deduplicated title event.
    pub async fn handle_title_change(self: &Arc<Self>, title: &str, source: TitleSource) {
        if lock(&self.state).stopped {
            return;
        }

        // Commit the previous title's work before adopting the new one.
        let previous = self.sessions.latest_title(&self.worktree_path);
        let committed = match &previous {
            Some(prev) if prev != title => {
                info!(
                    worktree = %self.worktree_path.display(),
                    from = %prev,
                    to = %title,
                    "title change"
                );
                self.commit_work(prev).await
            }
            _ => None,
        };

        self.sessions
            .record_title(&self.worktree_path, title, source);
        if let Some(hash) = &committed {
            self.sessions
                .set_previous_commit_hash(&self.worktree_path, hash);
            refresh_worktree_status(&self.registry, &self.worktree_path).await;
        }

        let generation = {
            let mut state = lock(&self.state);
            if state.stopped {
                return;
            }
            state.current_title = Some(title.to_string());
            state.timer_generation += 1;
            state.timer_generation
        };

        self.maybe_start_graduation(title).await;
        self.spawn_timer(generation);
    }

    /// Latch and spawn a graduation worker when the worktree sits on a
    /// scratch branch and no rename is already in flight.
    async fn maybe_start_graduation(self: &Arc<Self>, title: &str) {
        if lock(&self.state).renaming_in_progress {
            return;
        }

        let on_scratch = match graduate::current_branch(&self.worktree_path).await {
            Ok(branch) => is_scratch_branch(&branch),
            Err(err) => {
                debug!(
                    worktree = %self.worktree_path.display(),
                    error = %err,
                    "could not resolve current branch"
                );
                false
            }
        };
        if !on_scratch {
            return;
        }

        let armed = {
            let mut state = lock(&self.state);
            if state.stopped || state.renaming_in_progress {
                false
            } else {
                state.renaming_in_progress = true;
                true
            }
        };
        if armed {
            self.spawn_graduation(title.to_string());
        }
    }

    /// Spawn the one-shot graduation worker. The in-flight latch is cleared
    /// on every exit path.
    pub(crate) fn spawn_graduation(self: &Arc<Self>, title: String) {
        let manager = self.clone();
        spawn_supervised("branch-graduation", async move {
            let result = graduate::run(
                manager.llm.as_ref(),
                manager.llm_timeout,
                &manager.registry,
                &manager.git_lock,
                &manager.worktree_path,
                &title,
            )
            .await;

            match result {
                Ok(_) => {}
                Err(GraduateError::NotScratchBranch(branch)) => {
                    debug!(branch = %branch, "skipping graduation, branch already graduated");
                }
                Err(err) => {
                    warn!(
                        worktree = %manager.worktree_path.display(),
                        error = %err,
                        "branch graduation failed"
                    );
                }
            }

            lock(&manager.state).renaming_in_progress = false;
        });
    }

    /// Arm the latch and spawn a graduation for `title` (manual trigger).
    /// Returns false when a rename is already in flight.
    pub(crate) fn request_graduation(self: &Arc<Self>, title: String) -> bool {
        let armed = {
            let mut state = lock(&self.state);
            if state.stopped || state.renaming_in_progress {
                false
            } else {
                state.renaming_in_progress = true;
                true
            }
        };
        if armed {
            self.spawn_graduation(title);
        }
        armed
    }

    /// Manual rename to a custom name (bypasses the scratch predicate).
    pub async fn rename_to_custom(&self, name: &str) -> Result<String, GraduateError> {
        graduate::rename_to_custom(&self.registry, &self.git_lock, &self.worktree_path, name).await
    }

    fn spawn_timer(self: &Arc<Self>, generation: u64) {
        let manager = self.clone();
        spawn_supervised("checkpoint-timer", async move {
            manager.run_timer(generation).await;
        });
    }

    /// The debounce loop. There is no quiescent terminal state: as long as
    /// the generation stays current and a title exists, a fire with no
    /// changes simply reschedules.
    async fn run_timer(&self, generation: u64) {
        loop {
            tokio::time::sleep(self.checkpoint_interval).await;

            let title = {
                let state = lock(&self.state);
                if state.stopped || state.timer_generation != generation {
                    return;
                }
                match &state.current_title {
                    Some(title) => title.clone(),
                    None => return,
                }
            };

            match ops::has_uncommitted_changes(&self.worktree_path).await {
                Ok(true) => {
                    if let Some(hash) = self.commit_work(&title).await {
                        self.sessions
                            .set_latest_commit_hash(&self.worktree_path, &hash);
                        refresh_worktree_status(&self.registry, &self.worktree_path).await;
                        info!(
                            worktree = %self.worktree_path.display(),
                            title = %title,
                            hash = %hash,
                            "created checkpoint"
                        );
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        worktree = %self.worktree_path.display(),
                        error = %err,
                        "failed to check for uncommitted changes"
                    );
                }
            }
        }
    }

    /// Stage-and-commit under the git lock. Returns the commit hash, or
    /// `None` when there was nothing to commit or the commit failed (the
    /// failure is logged; state is unchanged and the next event retries).
    async fn commit_work(&self, title: &str) -> Option<String> {
        let _guard = self.git_lock.lock().await;
        match ops::stage_and_commit(&self.worktree_path, title).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    worktree = %self.worktree_path.display(),
                    title = %title,
                    error = %err,
                    "failed to commit work"
                );
                None
            }
        }
    }

    /// Stop the manager: cancel timers and flush pending work with the
    /// current title.
    pub async fn stop(&self) {
        let title = {
            let mut state = lock(&self.state);
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.timer_generation += 1;
            state.current_title.take()
        };

        if let Some(title) = title {
            if let Some(hash) = self.commit_work(&title).await {
                self.sessions
                    .set_latest_commit_hash(&self.worktree_path, &hash);
                refresh_worktree_status(&self.registry, &self.worktree_path).await;
                info!(
                    worktree = %self.worktree_path.display(),
                    title = %title,
                    "committed pending work on stop"
                );
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
