//! The supervisor: owns the event sources and the checkpoint managers.
//!
//! `start()` spins up three background tasks — the title-log watcher, the
//! transcript watcher, and the router that turns surviving title events
//! into checkpoint-manager calls. `stop()` cancels them, joins them with a
//! bounded wait, then stops every manager (committing pending work).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use catnip_core::config::SupervisorConfig;
use catnip_core::llm::CompletionClient;
use catnip_core::title::{TitleEvent, TitleSource};

use crate::checkpoint::CheckpointManager;
use crate::cleanup::cleanup_scratch_branches;
use crate::graduate::GraduateError;
use crate::ingest::TitleIngestor;
use crate::registry::WorktreeRegistry;
use crate::session::SessionStore;
use crate::tasks::spawn_supervised;
use crate::todo_watcher::TodoWatcher;

/// Bound on joining each background task at shutdown.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrates title ingestion, transcript watching, and per-worktree
/// checkpoint managers.
pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<WorktreeRegistry>,
    sessions: Arc<SessionStore>,
    llm: Arc<dyn CompletionClient>,
    ingestor: Arc<TitleIngestor>,
    todo_watcher: Arc<TodoWatcher>,
    managers: Mutex<HashMap<PathBuf, Arc<CheckpointManager>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    event_rx: Mutex<Option<mpsc::Receiver<TitleEvent>>>,
}

impl Supervisor {
    /// Build a supervisor, loading the persisted registry snapshot.
    pub fn new(config: SupervisorConfig, llm: Arc<dyn CompletionClient>) -> Arc<Self> {
        let registry = Arc::new(WorktreeRegistry::load(config.state_file_path()));
        let sessions = Arc::new(SessionStore::new());

        let (event_tx, event_rx) = mpsc::channel(256);
        let ingestor = Arc::new(TitleIngestor::new(
            &config.title_log_path,
            &config.workspace_dir,
            event_tx,
        ));
        let todo_watcher = Arc::new(TodoWatcher::new(&config.projects_dir, registry.clone()));

        Arc::new(Self {
            config,
            registry,
            sessions,
            llm,
            ingestor,
            todo_watcher,
            managers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            event_rx: Mutex::new(Some(event_rx)),
        })
    }

    pub fn registry(&self) -> &Arc<WorktreeRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start all background tasks. Idempotent only in the sense that a
    /// second call finds the routing channel already taken and does
    /// nothing.
    pub async fn start(self: &Arc<Self>) {
        let Some(event_rx) = lock(&self.event_rx).take() else {
            warn!("supervisor already started");
            return;
        };

        info!(
            workspace = %self.config.workspace_dir.display(),
            title_log = %self.config.title_log_path.display(),
            projects = %self.config.projects_dir.display(),
            "starting workspace supervisor"
        );

        if self.config.dev_mode {
            debug!("dev mode: skipping scratch branch cleanup");
        } else {
            cleanup_scratch_branches(&self.registry).await;
        }

        let router = {
            let supervisor = self.clone();
            spawn_supervised("title-router", async move {
                supervisor.run_router(event_rx).await;
            })
        };
        let title_watcher = {
            let supervisor = self.clone();
            spawn_supervised("title-log-watcher", async move {
                supervisor.run_title_log_watcher().await;
            })
        };
        let transcript_watcher = {
            let supervisor = self.clone();
            spawn_supervised("transcript-watcher", async move {
                supervisor.run_transcript_watcher().await;
            })
        };

        let mut tasks = lock(&self.tasks);
        tasks.push(router);
        tasks.push(title_watcher);
        tasks.push(transcript_watcher);
    }

    /// Stop everything: cancel the loops, join them, then stop every
    /// checkpoint manager (which commits pending work) and persist a final
    /// snapshot.
    pub async fn stop(&self) {
        info!("stopping workspace supervisor");
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await.is_err() {
                warn!("background task did not stop within the shutdown timeout");
            }
        }

        let managers: Vec<Arc<CheckpointManager>> = {
            let mut map = lock(&self.managers);
            map.drain().map(|(_, manager)| manager).collect()
        };
        for manager in managers {
            manager.stop().await;
        }

        if let Err(err) = self.registry.save_now() {
            warn!(error = %err, "failed to persist final state snapshot");
        }
    }

    /// Inject a pty-sourced title change (the PTY-side detector's entry
    /// point). Runs through the same normalization and dedup as the log.
    pub async fn notify_title_change(&self, cwd: &Path, title: &str) {
        self.ingestor.offer(cwd, title, TitleSource::Pty).await;
    }

    /// Manually graduate or rename the branch of a worktree.
    ///
    /// With a custom name the rename happens synchronously (any branch,
    /// collision-resolved). Without one, the automatic graduation runs in
    /// the background using the current session title.
    pub async fn trigger_branch_rename(
        &self,
        worktree_path: &Path,
        custom_name: Option<&str>,
    ) -> Result<(), GraduateError> {
        let manager = lock(&self.managers)
            .get(worktree_path)
            .cloned()
            .ok_or_else(|| GraduateError::NoManager(worktree_path.display().to_string()))?;

        match custom_name {
            Some(name) if !name.trim().is_empty() => {
                manager.rename_to_custom(name.trim()).await?;
                Ok(())
            }
            _ => {
                let title = manager.current_title().ok_or(GraduateError::NoTitle)?;
                if !manager.request_graduation(title) {
                    debug!(
                        worktree = %worktree_path.display(),
                        "rename already in flight, not starting another"
                    );
                }
                Ok(())
            }
        }
    }

    /// The manager for a path, if one exists.
    pub fn manager_for(&self, worktree_path: &Path) -> Option<Arc<CheckpointManager>> {
        lock(&self.managers).get(worktree_path).cloned()
    }

    /// Detach a worktree that is being deleted by the worktree manager:
    /// stop its checkpoint manager (committing pending work) and drop its
    /// session history. The registry entry is the caller's to remove.
    pub async fn detach_worktree(&self, worktree_path: &Path) {
        let manager = lock(&self.managers).remove(worktree_path);
        if let Some(manager) = manager {
            info!(worktree = %worktree_path.display(), "detaching worktree");
            manager.stop().await;
        }
        self.sessions.remove(worktree_path);
    }

    /// Single consumer of surviving title events; per-worktree order equals
    /// ingestion order.
    async fn run_router(self: &Arc<Self>, mut event_rx: mpsc::Receiver<TitleEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = event_rx.recv() => {
                    let Some(event) = event else { return };
                    let manager = self.manager_for_path(&event.cwd);
                    manager.handle_title_change(&event.title, event.source).await;
                }
            }
        }
    }

    /// Get or lazily create the checkpoint manager for a worktree path.
    /// The map holds at most one manager per path.
    fn manager_for_path(self: &Arc<Self>, path: &Path) -> Arc<CheckpointManager> {
        let mut managers = lock(&self.managers);
        managers
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                info!(worktree = %path.display(), "creating checkpoint manager");
                CheckpointManager::new(
                    path,
                    self.config.checkpoint_interval,
                    self.config.llm_timeout,
                    self.registry.clone(),
                    self.sessions.clone(),
                    self.llm.clone(),
                )
            })
            .clone()
    }

    /// Tail the title event log: initial backlog, then re-read on every
    /// write the directory watcher reports.
    async fn run_title_log_watcher(self: &Arc<Self>) {
        self.ingestor.drain_log().await;

        let log_path = self.ingestor.log_path().to_path_buf();
        let Some(log_dir) = log_path.parent().map(Path::to_path_buf) else {
            warn!(path = %log_path.display(), "title log has no parent directory");
            return;
        };

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(64);
        let watched_path = log_path.clone();
        let mut watcher = match notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_)
                    ) && event.paths.iter().any(|p| p == &watched_path);
                    if relevant {
                        // Full channel just means a re-read is already queued.
                        let _ = notify_tx.try_send(());
                    }
                }
                Err(err) => error!(error = %err, "title log watcher error"),
            },
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(error = %err, "failed to create title log watcher");
                return;
            }
        };

        if let Err(err) = watcher.watch(&log_dir, RecursiveMode::NonRecursive) {
            // Degraded mode: no tailing, no restart.
            warn!(dir = %log_dir.display(), error = %err, "failed to watch title log directory");
            return;
        }
        info!(path = %log_path.display(), "watching title event log");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                received = notify_rx.recv() => {
                    if received.is_none() {
                        return;
                    }
                    self.ingestor.drain_log().await;
                }
            }
        }
    }

    /// Watch the transcript root for `.jsonl` writes and mirror task lists
    /// into the registry.
    async fn run_transcript_watcher(self: &Arc<Self>) {
        let projects_dir = self.todo_watcher.projects_dir().to_path_buf();
        if !projects_dir.exists() {
            warn!(
                dir = %projects_dir.display(),
                "transcript directory does not exist; todo watcher idle"
            );
            return;
        }

        let (notify_tx, mut notify_rx) = mpsc::channel::<PathBuf>(256);
        let mut watcher = match notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
                            let _ = notify_tx.try_send(path);
                        }
                    }
                }
                Err(err) => error!(error = %err, "transcript watcher error"),
            },
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(error = %err, "failed to create transcript watcher");
                return;
            }
        };

        if let Err(err) = watcher.watch(&projects_dir, RecursiveMode::Recursive) {
            warn!(dir = %projects_dir.display(), error = %err, "failed to watch transcript directory");
            return;
        }
        info!(dir = %projects_dir.display(), "watching session transcripts");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                path = notify_rx.recv() => {
                    let Some(path) = path else { return };
                    self.todo_watcher.handle_transcript_event(&path).await;
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
