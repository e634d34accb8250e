//! Startup cleanup of abandoned scratch branches.
//!
//! Scratch branches accumulate as sessions come and go; ones that never got
//! a commit are noise. At startup (outside dev mode) every registered
//! repository is swept: scratch branches with no commits ahead of the base
//! branch and no worktree checked out on them are force-deleted.

use std::path::Path;

use tracing::{debug, info, warn};

use catnip_git::names::is_scratch_branch;
use catnip_git::ops::{self, ListBranchesOptions};

use crate::registry::WorktreeRegistry;

/// Sweep all registered repositories. Returns the number of deleted
/// branches.
pub async fn cleanup_scratch_branches(registry: &WorktreeRegistry) -> usize {
    let mut total = 0;
    for repo in registry.repositories() {
        total += cleanup_repository(&repo.path, &repo.id).await;
    }
    if total > 0 {
        info!(deleted = total, "cleaned up unused scratch branches");
    }
    total
}

async fn cleanup_repository(repo_path: &Path, repo_id: &str) -> usize {
    let branches = match ops::list_branches(
        repo_path,
        &ListBranchesOptions {
            all: true,
            merged: None,
        },
    )
    .await
    {
        Ok(branches) => branches,
        Err(err) => {
            warn!(repo = repo_id, error = %err, "failed to list branches");
            return 0;
        }
    };

    let Some(base) = base_branch(repo_path).await else {
        debug!(repo = repo_id, "no main/master base branch, skipping cleanup");
        return 0;
    };

    let checked_out: Vec<String> = match ops::list_worktrees(repo_path).await {
        Ok(worktrees) => worktrees.into_iter().filter_map(|w| w.branch).collect(),
        Err(err) => {
            warn!(repo = repo_id, error = %err, "failed to list worktrees");
            Vec::new()
        }
    };

    let mut deleted = 0;
    for branch in branches {
        if !is_scratch_branch(&branch) {
            continue;
        }
        if checked_out.iter().any(|b| b == &branch) {
            continue;
        }
        match ops::branch_exists(repo_path, &branch, false).await {
            Ok(true) => {}
            _ => continue,
        }
        match ops::count_commits(repo_path, &base, &branch).await {
            Ok(0) => {}
            _ => continue,
        }
        match ops::delete_branch(repo_path, &branch, true).await {
            Ok(()) => {
                info!(repo = repo_id, branch = %branch, "deleted unused scratch branch");
                deleted += 1;
            }
            Err(err) => {
                warn!(repo = repo_id, branch = %branch, error = %err, "failed to delete scratch branch");
            }
        }
    }
    deleted
}

async fn base_branch(repo_path: &Path) -> Option<String> {
    for candidate in ["main", "master"] {
        if ops::branch_exists(repo_path, candidate, false)
            .await
            .unwrap_or(false)
        {
            return Some(candidate.to_string());
        }
    }
    None
}
