//! Git error classification.

use thiserror::Error;

/// Classified failure from a git invocation.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository")]
    NotARepo,

    #[error("branch or ref not found: {0}")]
    BranchMissing(String),

    #[error("push rejected (non-fast-forward)")]
    PushRejectedNonFastForward,

    #[error("merge conflict: {0}")]
    MergeConflict(String),

    #[error("index has staged or uncommitted changes")]
    IndexHasStagedChanges,

    #[error("invalid ref format: {0}")]
    RefFormatInvalid(String),

    #[error("transient git failure: {0}")]
    Transient(String),

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git failed: {0}")]
    Other(String),
}

impl GitError {
    /// Whether a retry on the next scheduled attempt is reasonable.
    pub fn is_transient(&self) -> bool {
        matches!(self, GitError::Transient(_))
    }
}

/// Classify a failed git command by the text it printed.
///
/// `output` is the concatenation of stderr and stdout — git reports
/// conflicts on stdout and most everything else on stderr.
pub fn classify_failure(output: &str) -> GitError {
    let trimmed = output.trim();

    if trimmed.contains("not a git repository") {
        return GitError::NotARepo;
    }
    if trimmed.contains("non-fast-forward")
        || (trimmed.contains("[rejected]") && trimmed.contains("fetch first"))
        || trimmed.contains("failed to push some refs")
    {
        return GitError::PushRejectedNonFastForward;
    }
    if trimmed.contains("CONFLICT")
        || trimmed.contains("Automatic merge failed")
        || trimmed.contains("could not apply")
    {
        return GitError::MergeConflict(trimmed.to_string());
    }
    if trimmed.contains("Your index contains uncommitted changes")
        || trimmed.contains("Please commit or stash them")
        || trimmed.contains("cannot rebase: You have unstaged changes")
    {
        return GitError::IndexHasStagedChanges;
    }
    if trimmed.contains("is not a valid ref name")
        || trimmed.contains("is not a valid branch name")
    {
        return GitError::RefFormatInvalid(trimmed.to_string());
    }
    if trimmed.contains("unknown revision")
        || trimmed.contains("did not match any file(s) known to git")
        || trimmed.contains("couldn't find remote ref")
        || trimmed.contains("Needed a single revision")
    {
        return GitError::BranchMissing(trimmed.to_string());
    }
    if trimmed.contains("Could not resolve host")
        || trimmed.contains("unable to access")
        || trimmed.contains("Connection refused")
        || trimmed.contains("Connection timed out")
        || trimmed.contains("Operation timed out")
        || trimmed.contains("early EOF")
    {
        return GitError::Transient(trimmed.to_string());
    }

    GitError::Other(trimmed.to_string())
}
