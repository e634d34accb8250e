//! Fetch and push strategies.
//!
//! Callers describe what they want as a record; argument assembly lives
//! here. With `sync_on_reject` set, a non-fast-forward rejection triggers
//! one rebase onto the upstream branch followed by a single retry.

use std::path::Path;

use tracing::info;

use crate::error::GitError;
use crate::exec::run_git;
use crate::ops;

/// How to fetch a branch.
#[derive(Debug, Clone, Default)]
pub struct FetchStrategy {
    pub branch: String,
    /// Remote name; defaults to `origin`.
    pub remote: Option<String>,
    /// Explicit remote URL or path, overriding the named remote.
    pub remote_url: Option<String>,
    /// Shallow depth; `None` fetches full history.
    pub depth: Option<u32>,
    /// Update the matching local ref (`branch:branch` refspec).
    pub update_local_ref: bool,
}

/// How to push a branch.
#[derive(Debug, Clone, Default)]
pub struct PushStrategy {
    pub branch: String,
    /// Remote name; defaults to `origin`.
    pub remote: Option<String>,
    /// Explicit remote URL or path, overriding the named remote.
    pub remote_url: Option<String>,
    pub set_upstream: bool,
    /// Rewrite `git@host:owner/repo` remotes to HTTPS before pushing.
    pub convert_to_https: bool,
    pub force: bool,
    /// On a non-fast-forward rejection, rebase onto the upstream branch and
    /// retry once.
    pub sync_on_reject: bool,
}

/// Fetch per strategy.
pub async fn fetch(dir: &Path, strategy: &FetchStrategy) -> Result<(), GitError> {
    let depth_arg = strategy.depth.map(|d| d.to_string());
    let refspec = if strategy.update_local_ref {
        format!("{0}:{0}", strategy.branch)
    } else {
        strategy.branch.clone()
    };
    let target = remote_target(strategy.remote.as_deref(), strategy.remote_url.as_deref(), false);

    let mut args: Vec<&str> = vec!["fetch", &target];
    if let Some(depth) = depth_arg.as_deref() {
        args.push("--depth");
        args.push(depth);
    }
    args.push(&refspec);
    args.push("--quiet");

    run_git(dir, &args).await?;
    Ok(())
}

/// Push per strategy.
pub async fn push(dir: &Path, strategy: &PushStrategy) -> Result<(), GitError> {
    let result = push_once(dir, strategy).await;

    if strategy.sync_on_reject {
        if let Err(GitError::PushRejectedNonFastForward) = &result {
            info!(branch = %strategy.branch, "push rejected, syncing with upstream and retrying");
            sync_with_upstream(dir, strategy).await?;
            let retry = PushStrategy {
                sync_on_reject: false,
                ..strategy.clone()
            };
            return push_once(dir, &retry).await;
        }
    }

    result
}

async fn push_once(dir: &Path, strategy: &PushStrategy) -> Result<(), GitError> {
    let target = remote_target(
        strategy.remote.as_deref(),
        strategy.remote_url.as_deref(),
        strategy.convert_to_https,
    );

    let mut args: Vec<&str> = vec!["push"];
    if strategy.set_upstream {
        args.push("-u");
    }
    if strategy.force {
        args.push("--force");
    }
    args.push(&target);
    args.push(&strategy.branch);

    run_git(dir, &args).await?;
    Ok(())
}

/// Rebase the current branch onto its upstream counterpart. A branch that
/// does not exist upstream yet, or that is not behind, is left alone.
async fn sync_with_upstream(dir: &Path, strategy: &PushStrategy) -> Result<(), GitError> {
    let fetch_strategy = FetchStrategy {
        branch: strategy.branch.clone(),
        remote: strategy.remote.clone(),
        remote_url: strategy.remote_url.clone(),
        ..Default::default()
    };
    if fetch(dir, &fetch_strategy).await.is_err() {
        return Ok(());
    }

    let remote = strategy.remote.as_deref().unwrap_or("origin");
    let upstream = format!("{remote}/{}", strategy.branch);
    match ops::count_commits(dir, "HEAD", &upstream).await {
        Ok(0) | Err(_) => Ok(()),
        Ok(_) => ops::rebase(dir, &upstream).await,
    }
}

fn remote_target(remote: Option<&str>, remote_url: Option<&str>, convert_to_https: bool) -> String {
    match remote_url {
        Some(url) if convert_to_https => ssh_to_https(url),
        Some(url) => url.to_string(),
        None => remote.unwrap_or("origin").to_string(),
    }
}

/// Convert `git@host:owner/repo(.git)` and `ssh://git@host/owner/repo` URLs
/// to their HTTPS equivalents; anything else passes through unchanged.
pub fn ssh_to_https(url: &str) -> String {
    let trimmed = url.trim();
    if let Some(rest) = trimmed.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return format!("https://{host}/{}", path.trim_start_matches('/'));
        }
    }
    if let Some(rest) = trimmed.strip_prefix("ssh://") {
        let rest = rest.strip_prefix("git@").unwrap_or(rest);
        if let Some((host, path)) = rest.split_once('/') {
            return format!("https://{host}/{path}");
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_scp_form_converts() {
        assert_eq!(
            ssh_to_https("git@github.com:vanpelt/catnip.git"),
            "https://github.com/vanpelt/catnip.git"
        );
    }

    #[test]
    fn ssh_url_form_converts() {
        assert_eq!(
            ssh_to_https("ssh://git@github.com/vanpelt/catnip.git"),
            "https://github.com/vanpelt/catnip.git"
        );
    }

    #[test]
    fn https_and_paths_pass_through() {
        assert_eq!(
            ssh_to_https("https://github.com/vanpelt/catnip.git"),
            "https://github.com/vanpelt/catnip.git"
        );
        assert_eq!(ssh_to_https("/live/catnip"), "/live/catnip");
    }

    #[tokio::test]
    async fn push_and_fetch_round_trip_through_a_bare_remote() {
        let tmp = tempfile::tempdir().unwrap();
        run_git(tmp.path(), &["init", "--bare", "remote.git"])
            .await
            .unwrap();
        let remote = tmp.path().join("remote.git");

        let work = tmp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        run_git(&work, &["init"]).await.unwrap();
        run_git(&work, &["config", "user.email", "t@example.com"])
            .await
            .unwrap();
        run_git(&work, &["config", "user.name", "T"]).await.unwrap();
        std::fs::write(work.join("a.txt"), "1").unwrap();
        ops::stage_and_commit(&work, "one").await.unwrap();
        let branch = run_git(&work, &["branch", "--show-current"])
            .await
            .unwrap();
        run_git(&work, &["remote", "add", "origin", &remote.to_string_lossy()])
            .await
            .unwrap();

        push(
            &work,
            &PushStrategy {
                branch: branch.clone(),
                set_upstream: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(ops::branch_exists(&remote, &branch, false).await.unwrap());

        let other = tmp.path().join("other");
        run_git(tmp.path(), &["clone", &remote.to_string_lossy(), "other"])
            .await
            .unwrap();

        std::fs::write(work.join("a.txt"), "2").unwrap();
        let new_hash = ops::stage_and_commit(&work, "two").await.unwrap().unwrap();
        push(
            &work,
            &PushStrategy {
                branch: branch.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        fetch(
            &other,
            &FetchStrategy {
                branch: branch.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ops::rev_parse(&other, "FETCH_HEAD").await.unwrap(), new_hash);
    }

    #[test]
    fn remote_target_precedence() {
        assert_eq!(remote_target(None, None, false), "origin");
        assert_eq!(remote_target(Some("live"), None, false), "live");
        assert_eq!(
            remote_target(Some("live"), Some("/live/catnip"), false),
            "/live/catnip"
        );
        assert_eq!(
            remote_target(None, Some("git@github.com:a/b.git"), true),
            "https://github.com/a/b.git"
        );
    }
}
