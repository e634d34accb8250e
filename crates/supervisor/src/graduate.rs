//! Branch graduation: renaming a machine-generated scratch branch to a
//! semantic name suggested by the LLM.
//!
//! A graduation is single-shot. It re-checks the branch (the worktree may
//! have moved on since the title event), asks for a name, validates it,
//! resolves collisions, performs the rename, and updates the registry in
//! one observable step. The caller owns the in-flight latch.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use catnip_core::llm::{CompletionClient, CompletionRequest, LlmError};
use catnip_git::error::GitError;
use catnip_git::names::{is_scratch_branch, validate_branch_name};
use catnip_git::{ops, run_git};

use crate::registry::{WorktreePatch, WorktreeRegistry};

/// Attempts beyond the base name before giving up on collisions.
const MAX_COLLISION_SUFFIX: u32 = 100;

#[derive(Debug, Error)]
pub enum GraduateError {
    #[error("no checkpoint manager exists for worktree {0}")]
    NoManager(String),

    #[error("no session title available for automatic naming")]
    NoTitle,

    #[error("current branch {0:?} is not a scratch branch")]
    NotScratchBranch(String),

    #[error("branch name suggestion timed out")]
    SuggestionTimeout,

    #[error("branch name suggestion was empty")]
    EmptySuggestion,

    #[error("invalid branch name: {0:?}")]
    InvalidName(String),

    #[error("too many similar branches exist for {0:?}")]
    CollisionExhausted(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Resolve the branch the worktree is currently on.
///
/// `rev-parse --symbolic-full-name HEAD` yields a full ref on a branch, but
/// a bare 40-char object hash on a detached HEAD; in that case the branch
/// is recovered from the header line of `git status --porcelain=v1 -b`.
pub async fn current_branch(worktree_path: &Path) -> Result<String, GitError> {
    let head = ops::current_head_symbolic(worktree_path).await?;

    let looks_detached =
        head.len() == 40 && !head.contains('/') && head.chars().all(|c| c.is_ascii_hexdigit());
    if looks_detached {
        if let Some(branch) = ops::current_branch_from_status(worktree_path).await? {
            return Ok(branch);
        }
    }

    Ok(head)
}

/// Automatic graduation driven by a session title. Returns the final branch
/// name on success.
///
/// `rename_lock` is the per-worktree lock shared with the checkpoint path;
/// it is held only around the rename itself so a 60 s completion wait never
/// starves checkpoint commits.
pub async fn run(
    llm: &dyn CompletionClient,
    llm_timeout: Duration,
    registry: &WorktreeRegistry,
    rename_lock: &tokio::sync::Mutex<()>,
    worktree_path: &Path,
    title: &str,
) -> Result<String, GraduateError> {
    let current = current_branch(worktree_path).await?;
    if !is_scratch_branch(&current) {
        return Err(GraduateError::NotScratchBranch(current));
    }

    let suggestion = suggest_branch_name(llm, llm_timeout, worktree_path, title).await?;
    validate_suggestion(worktree_path, &suggestion).await?;

    let _guard = rename_lock.lock().await;
    let final_name = resolve_collisions(worktree_path, &suggestion).await?;

    if final_name != suggestion {
        info!(suggested = %suggestion, using = %final_name, "branch name already exists, using suffixed variant");
    }

    rename_branch(registry, worktree_path, &current, &final_name).await?;
    Ok(final_name)
}

/// Manual rename to a caller-provided name. Unlike the automatic path this
/// allows renaming any branch, not only scratch branches.
pub async fn rename_to_custom(
    registry: &WorktreeRegistry,
    rename_lock: &tokio::sync::Mutex<()>,
    worktree_path: &Path,
    custom_name: &str,
) -> Result<String, GraduateError> {
    let current = current_branch(worktree_path).await?;

    validate_suggestion(worktree_path, custom_name).await?;

    let _guard = rename_lock.lock().await;
    let final_name = resolve_collisions(worktree_path, custom_name).await?;

    if final_name != custom_name {
        info!(requested = %custom_name, using = %final_name, "branch name already exists, using suffixed variant");
    }

    rename_branch(registry, worktree_path, &current, &final_name).await?;
    Ok(final_name)
}

/// Ask the LLM for a conventional branch name, bounded by `llm_timeout`.
async fn suggest_branch_name(
    llm: &dyn CompletionClient,
    llm_timeout: Duration,
    worktree_path: &Path,
    title: &str,
) -> Result<String, GraduateError> {
    let request = CompletionRequest {
        prompt: branch_name_prompt(title),
        system_prompt: Some(
            "You generate git branch names. Reply with only the branch name, \
             no explanation or extra text."
                .to_string(),
        ),
        max_turns: 1,
        working_directory: worktree_path.to_path_buf(),
        resume: true,
    };

    let response = tokio::time::timeout(llm_timeout, llm.create_completion(request))
        .await
        .map_err(|_| GraduateError::SuggestionTimeout)??;

    let suggestion = response.response.trim().to_string();
    if suggestion.is_empty() {
        return Err(GraduateError::EmptySuggestion);
    }
    Ok(suggestion)
}

fn branch_name_prompt(title: &str) -> String {
    format!(
        r#"Based on this coding session title: "{title}"

Generate a git branch name that:
1. Follows conventional patterns like: feature/add-auth, chore/update-deps, refactor/cleanup-api, bug/fix-login, docs/update-readme
2. Uses only lowercase letters, numbers, hyphens, and forward slashes
3. Is concise but descriptive (max 60 characters)
4. Common prefixes: feature, chore, refactor, bug, docs, test, style, perf, fix

Respond with ONLY the branch name, nothing else."#
    )
}

/// Syntactic validation plus git's own `check-ref-format` gate.
async fn validate_suggestion(worktree_path: &Path, name: &str) -> Result<(), GraduateError> {
    if !validate_branch_name(name) {
        return Err(GraduateError::InvalidName(name.to_string()));
    }
    if !ops::check_ref_format(worktree_path, name).await? {
        return Err(GraduateError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Append `-1`, `-2`, … while the name is taken. A suggestion equal to the
/// current branch is handled here too: the branch exists, so it gets a
/// suffix rather than a no-op rename.
async fn resolve_collisions(worktree_path: &Path, name: &str) -> Result<String, GraduateError> {
    let mut candidate = name.to_string();
    let mut counter: u32 = 0;

    loop {
        if !ops::branch_exists(worktree_path, &candidate, false).await? {
            return Ok(candidate);
        }
        counter += 1;
        if counter > MAX_COLLISION_SUFFIX {
            return Err(GraduateError::CollisionExhausted(name.to_string()));
        }
        candidate = format!("{name}-{counter}");
    }
}

/// `checkout -b <new>` (works from any starting ref, including detached
/// ones), then best-effort delete of the old branch, then the registry
/// update the UI observes.
async fn rename_branch(
    registry: &WorktreeRegistry,
    worktree_path: &Path,
    old: &str,
    new: &str,
) -> Result<(), GraduateError> {
    run_git(worktree_path, &["checkout", "-b", new]).await?;

    let old_short = old.strip_prefix("refs/heads/").unwrap_or(old);
    if let Err(err) = ops::delete_branch(worktree_path, old_short, true).await {
        warn!(branch = %old_short, error = %err, "failed to delete old branch ref");
    }

    if let Some(worktree) = registry.find_by_path(worktree_path) {
        registry.update_worktree(
            &worktree.id,
            WorktreePatch {
                branch: Some(new.to_string()),
                ..Default::default()
            },
        );
    }

    info!(from = %old, to = %new, worktree = %worktree_path.display(), "graduated branch");
    Ok(())
}
