//! Supervisor configuration.
//!
//! Everything the supervisor previously read from ad-hoc environment lookups
//! lives here as explicit configuration, resolved once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default workspace root containing all managed worktrees.
const DEFAULT_WORKSPACE_DIR: &str = "/workspace";

/// Default debounce interval between checkpoint commits.
const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for branch-name suggestions from the LLM.
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime configuration for the workspace supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Root directory under which all managed worktrees live.
    pub workspace_dir: PathBuf,
    /// Append-only title event log written by the terminal-title interceptor.
    pub title_log_path: PathBuf,
    /// Root of the agent's per-project session transcripts.
    pub projects_dir: PathBuf,
    /// Debounce interval for checkpoint commits.
    pub checkpoint_interval: Duration,
    /// Deadline for LLM branch-name suggestions.
    pub llm_timeout: Duration,
    /// Development mode: skips the startup scratch-branch cleanup.
    pub dev_mode: bool,
}

impl SupervisorConfig {
    /// Resolve configuration from the environment.
    ///
    /// - `CATNIP_WORKSPACE_DIR` overrides the workspace root (default `/workspace`).
    /// - `CATNIP_TITLE_LOG` overrides the title log path (default `~/.catnip/title_events.log`).
    /// - `CATNIP_DEV=true` enables development mode.
    pub fn from_env() -> Self {
        let workspace_dir = std::env::var("CATNIP_WORKSPACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WORKSPACE_DIR));

        let title_log_path = std::env::var("CATNIP_TITLE_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_title_log_path());

        let projects_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/"))
            .join(".claude")
            .join("projects");

        let dev_mode = std::env::var("CATNIP_DEV")
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            workspace_dir,
            title_log_path,
            projects_dir,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            dev_mode,
        }
    }

    /// Path of the persisted registry snapshot.
    pub fn state_file_path(&self) -> PathBuf {
        self.workspace_dir.join(".git-state").join("state.json")
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }

    pub fn with_title_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.title_log_path = path.into();
        self
    }

    pub fn with_projects_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.projects_dir = dir.into();
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Test-friendly constructor rooted at an arbitrary directory.
    pub fn for_workspace(workspace_dir: impl AsRef<Path>) -> Self {
        let workspace_dir = workspace_dir.as_ref().to_path_buf();
        Self {
            title_log_path: workspace_dir.join("title_events.log"),
            projects_dir: workspace_dir.join("projects"),
            workspace_dir,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            dev_mode: false,
        }
    }
}

fn default_title_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".catnip")
        .join("title_events.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_file_lives_under_workspace() {
        let config = SupervisorConfig::for_workspace("/workspace");
        assert_eq!(
            config.state_file_path(),
            PathBuf::from("/workspace/.git-state/state.json")
        );
    }

    #[test]
    fn builders_override_defaults() {
        let config = SupervisorConfig::for_workspace("/tmp/ws")
            .with_checkpoint_interval(Duration::from_millis(50))
            .with_dev_mode(true)
            .with_title_log_path("/tmp/titles.log");

        assert_eq!(config.checkpoint_interval, Duration::from_millis(50));
        assert!(config.dev_mode);
        assert_eq!(config.title_log_path, PathBuf::from("/tmp/titles.log"));
    }
}
