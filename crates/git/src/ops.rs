//! The git capability set used by the supervisor.
//!
//! Free async functions over a working directory. Operations that need a
//! bare exit-status answer use the raw runner so "missing" never shows up as
//! an error.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::GitError;
use crate::exec::{run_git, run_git_raw};
use crate::names::clean_branch_listing_name;

/// Options for [`list_branches`].
#[derive(Debug, Clone, Default)]
pub struct ListBranchesOptions {
    /// Include remote-tracking branches (`-a`).
    pub all: bool,
    /// Restrict to branches merged into the given ref (`--merged <ref>`).
    pub merged: Option<String>,
}

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// Whether `dir` is inside a git repository.
pub async fn is_git_repo(dir: &Path) -> bool {
    match run_git_raw(dir, &["rev-parse", "--git-dir"]).await {
        Ok(output) => output.success,
        Err(_) => false,
    }
}

/// Whether the working tree has staged, unstaged, or untracked changes.
pub async fn has_uncommitted_changes(dir: &Path) -> Result<bool, GitError> {
    let status = run_git(dir, &["status", "--porcelain"]).await?;
    Ok(!status.is_empty())
}

/// Whether a branch exists.
///
/// `name` may be a bare branch name or a full ref (anything starting with
/// `refs/` is verified as-is). With `remote` set, bare names are checked
/// under `refs/remotes/origin/`.
pub async fn branch_exists(dir: &Path, name: &str, remote: bool) -> Result<bool, GitError> {
    let full_ref = if name.starts_with("refs/") {
        name.to_string()
    } else if remote {
        format!("refs/remotes/origin/{name}")
    } else {
        format!("refs/heads/{name}")
    };

    let output = run_git_raw(dir, &["show-ref", "--verify", "--quiet", &full_ref]).await?;
    Ok(output.success)
}

/// List branch names, cleaned of listing markers (`*`, `+`, `remotes/origin/`).
pub async fn list_branches(
    dir: &Path,
    options: &ListBranchesOptions,
) -> Result<Vec<String>, GitError> {
    let mut args = vec!["branch"];
    if options.all {
        args.push("-a");
    }
    if let Some(merged) = &options.merged {
        args.push("--merged");
        args.push(merged);
    }

    let output = run_git(dir, &args).await?;
    Ok(output
        .lines()
        .map(clean_branch_listing_name)
        .filter(|name| !name.is_empty() && !name.contains("HEAD ->"))
        .collect())
}

/// List registered worktrees of a repository.
pub async fn list_worktrees(dir: &Path) -> Result<Vec<WorktreeEntry>, GitError> {
    let output = run_git(dir, &["worktree", "list", "--porcelain"]).await?;
    Ok(parse_worktree_porcelain(&output))
}

pub(crate) fn parse_worktree_porcelain(raw: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;

    for line in raw.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if let Some(p) = path.take() {
                entries.push(WorktreeEntry {
                    path: p,
                    branch: branch.take(),
                });
            }
            branch = None;
            continue;
        }
        if let Some(value) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(value.trim()));
        } else if let Some(value) = line.strip_prefix("branch ") {
            branch = value
                .trim()
                .strip_prefix("refs/heads/")
                .map(|s| s.to_string());
        }
    }
    entries
}

/// Delete a local branch (`-d`, or `-D` when forced).
pub async fn delete_branch(dir: &Path, name: &str, force: bool) -> Result<(), GitError> {
    let flag = if force { "-D" } else { "-d" };
    run_git(dir, &["branch", flag, name]).await?;
    Ok(())
}

/// `rev-parse --symbolic-full-name HEAD`: a full ref name on a branch, or a
/// bare object hash when HEAD is detached.
pub async fn current_head_symbolic(dir: &Path) -> Result<String, GitError> {
    run_git(dir, &["rev-parse", "--symbolic-full-name", "HEAD"]).await
}

/// Resolve a ref to an object hash.
pub async fn rev_parse(dir: &Path, reference: &str) -> Result<String, GitError> {
    run_git(dir, &["rev-parse", reference]).await
}

/// Whether `refs/heads/<name>` passes `git check-ref-format`.
pub async fn check_ref_format(dir: &Path, name: &str) -> Result<bool, GitError> {
    let full_ref = format!("refs/heads/{name}");
    let output = run_git_raw(dir, &["check-ref-format", &full_ref]).await?;
    Ok(output.success)
}

/// Count commits in `base..tip`.
pub async fn count_commits(dir: &Path, base: &str, tip: &str) -> Result<u64, GitError> {
    let range = format!("{base}..{tip}");
    let output = run_git(dir, &["rev-list", "--count", &range]).await?;
    output
        .parse::<u64>()
        .map_err(|_| GitError::Other(format!("unparseable commit count: {output}")))
}

/// Current branch name parsed from `git status --porcelain=v1 -b`.
///
/// The first line has the form `## <branch>...<upstream> [ahead 1]`; the
/// branch is the text before `...` or `[`. This works where
/// `rev-parse --symbolic-full-name` reports a detached HEAD.
pub async fn current_branch_from_status(dir: &Path) -> Result<Option<String>, GitError> {
    let output = run_git(dir, &["status", "--porcelain=v1", "-b"]).await?;
    Ok(parse_status_branch_line(&output))
}

pub(crate) fn parse_status_branch_line(status: &str) -> Option<String> {
    let info = status.lines().next()?.strip_prefix("## ")?;
    let branch = match info.find("...") {
        Some(idx) => &info[..idx],
        None => match info.find('[') {
            Some(idx) => info[..idx].trim_end(),
            None => info,
        },
    };
    let branch = branch.trim();
    if branch.is_empty() {
        None
    } else {
        Some(branch.to_string())
    }
}

/// Stage everything and commit with hooks bypassed, returning the new HEAD
/// hash. Returns `None` when the directory is not a repository or there was
/// nothing to commit.
pub async fn stage_and_commit(dir: &Path, message: &str) -> Result<Option<String>, GitError> {
    if !is_git_repo(dir).await {
        debug!(dir = %dir.display(), "not a git repository, skipping commit");
        return Ok(None);
    }

    run_git(dir, &["add", "."]).await?;

    // Exit status 0 means the index matches HEAD: nothing staged.
    let staged = run_git_raw(dir, &["diff", "--cached", "--quiet"]).await?;
    if staged.success {
        return Ok(None);
    }

    run_git(dir, &["commit", "-m", message, "-n"]).await?;
    let hash = rev_parse(dir, "HEAD").await?;
    Ok(Some(hash))
}

/// Merge a ref into the current branch.
pub async fn merge(dir: &Path, reference: &str) -> Result<(), GitError> {
    run_git(dir, &["merge", reference]).await?;
    Ok(())
}

/// Rebase the current branch onto a ref.
pub async fn rebase(dir: &Path, reference: &str) -> Result<(), GitError> {
    run_git(dir, &["rebase", reference]).await?;
    Ok(())
}

/// Run repository garbage collection.
pub async fn garbage_collect(dir: &Path) -> Result<(), GitError> {
    run_git(dir, &["gc", "--auto"]).await?;
    Ok(())
}

/// Best-effort default branch: `origin/HEAD` target, then the current
/// branch, then `main`.
pub async fn get_default_branch(dir: &Path) -> String {
    if let Ok(output) = run_git_raw(dir, &["symbolic-ref", "refs/remotes/origin/HEAD"]).await {
        if output.success {
            if let Some(branch) = output.stdout.strip_prefix("refs/remotes/origin/") {
                return branch.to_string();
            }
        }
    }
    if let Ok(output) = run_git_raw(dir, &["branch", "--show-current"]).await {
        if output.success && !output.stdout.is_empty() {
            return output.stdout;
        }
    }
    "main".to_string()
}
