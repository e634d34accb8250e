//! Git process execution.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::trace;

use crate::error::{classify_failure, GitError};

/// Raw output of a git invocation, before success/failure interpretation.
pub(crate) struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// stderr followed by stdout, for classification.
    pub(crate) fn combined(&self) -> String {
        let mut combined = self.stderr.clone();
        if !self.stdout.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&self.stdout);
        }
        combined
    }
}

/// Run git and capture output without interpreting the exit status.
///
/// Callers that treat a non-zero exit as data (`show-ref`, `diff --quiet`,
/// `check-ref-format`) go through this; everything else uses [`run_git`].
pub(crate) async fn run_git_raw(dir: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
    trace!(dir = %dir.display(), ?args, "git");

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run git in `dir`, returning trimmed stdout or a classified error.
pub async fn run_git(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = run_git_raw(dir, args).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(classify_failure(&output.combined()))
    }
}
