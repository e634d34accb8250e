//! Worktree status refresh.
//!
//! After every commit the supervisor makes, the registry entry for the
//! worktree is brought up to date so the UI learns the new commit count
//! without polling git itself.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use catnip_git::ops;

use crate::registry::{WorktreePatch, WorktreeRegistry};

/// Recompute HEAD hash, dirtiness, and ahead/behind counts for the worktree
/// at `path`, and patch the registry entry. Missing registry entries and
/// transient git failures are logged and skipped; the registry keeps its
/// previous values.
pub async fn refresh_worktree_status(registry: &WorktreeRegistry, path: &Path) {
    let Some(worktree) = registry.find_by_path(path) else {
        debug!(path = %path.display(), "no registered worktree for status refresh");
        return;
    };

    let source_ref = source_ref(registry, &worktree.repo_id, &worktree.source_branch);

    let commit_hash = match ops::rev_parse(path, "HEAD").await {
        Ok(hash) => Some(hash),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to resolve HEAD");
            None
        }
    };

    let is_dirty = match ops::has_uncommitted_changes(path).await {
        Ok(dirty) => Some(dirty),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to check working tree state");
            None
        }
    };

    // Ahead/behind counts need a resolvable source ref; a missing ref (e.g.
    // shallow clone without the base branch) leaves the counts untouched.
    let commit_count = match ops::count_commits(path, &source_ref, "HEAD").await {
        Ok(count) => Some(count),
        Err(err) => {
            debug!(path = %path.display(), source = %source_ref, error = %err, "could not count commits ahead");
            None
        }
    };
    let commits_behind = match ops::count_commits(path, "HEAD", &source_ref).await {
        Ok(count) => Some(count),
        Err(_) => None,
    };

    registry.update_worktree(
        &worktree.id,
        WorktreePatch {
            commit_hash,
            is_dirty,
            commit_count,
            commits_behind,
            last_accessed: Some(Utc::now()),
            ..Default::default()
        },
    );
}

/// The ref a worktree is measured against: the plain source branch for
/// local repositories (the local branch is the source of truth), the
/// origin-tracking ref otherwise.
fn source_ref(registry: &WorktreeRegistry, repo_id: &str, source_branch: &str) -> String {
    let is_local = registry
        .get_repository(repo_id)
        .map(|repo| repo.is_local())
        .unwrap_or_else(|| repo_id.starts_with("local/"));

    if is_local {
        source_branch.to_string()
    } else {
        format!("origin/{source_branch}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Worktree;
    use chrono::Utc;
    use std::path::PathBuf;

    fn registry_with(repo_id: &str) -> WorktreeRegistry {
        let registry = WorktreeRegistry::new(std::env::temp_dir().join("unused-state.json"));
        if repo_id.starts_with("local/") {
            registry.insert_repository(crate::registry::Repository {
                id: repo_id.to_string(),
                url: String::new(),
                path: PathBuf::from("/live/foo"),
                default_branch: "main".to_string(),
                created_at: Utc::now(),
                last_accessed: Utc::now(),
            });
        }
        registry
    }

    #[test]
    fn source_ref_depends_on_repo_kind() {
        let local = registry_with("local/foo");
        assert_eq!(source_ref(&local, "local/foo", "main"), "main");

        let remote = registry_with("vanpelt/catnip");
        assert_eq!(
            source_ref(&remote, "vanpelt/catnip", "main"),
            "origin/main"
        );
    }

    #[tokio::test]
    async fn refresh_updates_hash_and_dirty_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("alpha");
        std::fs::create_dir_all(&repo).unwrap();
        catnip_git::run_git(&repo, &["init"]).await.unwrap();
        catnip_git::run_git(&repo, &["config", "user.email", "t@example.com"])
            .await
            .unwrap();
        catnip_git::run_git(&repo, &["config", "user.name", "T"])
            .await
            .unwrap();
        std::fs::write(repo.join("a.txt"), "x").unwrap();
        let hash = ops::stage_and_commit(&repo, "init").await.unwrap().unwrap();
        let branch = catnip_git::run_git(&repo, &["branch", "--show-current"])
            .await
            .unwrap();

        let registry = registry_with("local/foo");
        let now = Utc::now();
        registry.insert_worktree(Worktree {
            id: "wt-1".into(),
            repo_id: "local/foo".into(),
            name: "alpha".into(),
            path: repo.clone(),
            branch: branch.clone(),
            source_branch: branch,
            commit_hash: String::new(),
            commit_count: 99,
            commits_behind: 0,
            is_dirty: false,
            has_conflicts: false,
            created_at: now,
            last_accessed: now,
            todos: Vec::new(),
        });

        std::fs::write(repo.join("b.txt"), "dirty").unwrap();
        refresh_worktree_status(&registry, &repo).await;

        let worktree = registry.get_worktree("wt-1").unwrap();
        assert_eq!(worktree.commit_hash, hash);
        assert!(worktree.is_dirty);
        assert_eq!(worktree.commit_count, 0);
    }
}
