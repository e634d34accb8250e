//! Path codec for agent session transcripts.
//!
//! Session transcripts live at
//! `<projects_dir>/<encoded-worktree>/<session-id>.jsonl`, where the encoded
//! directory name starts with `-` and replaces every `/` of the absolute
//! worktree path with `-`. Decoding reverses that mapping.

use std::path::{Path, PathBuf};

/// Decode an encoded project directory name back into a worktree path.
///
/// `-workspace-foo-alpha` → `/workspace/foo/alpha`. Returns `None` when the
/// name does not carry the leading `-` marker.
pub fn decode_project_dir_name(name: &str) -> Option<PathBuf> {
    let rest = name.strip_prefix('-')?;
    if rest.is_empty() {
        return None;
    }
    Some(PathBuf::from(format!("/{}", rest.replace('-', "/"))))
}

/// Derive the worktree path from a session transcript file path.
///
/// Only `.jsonl` files inside an encoded project directory resolve; anything
/// else returns `None`.
pub fn worktree_path_for_transcript(transcript: &Path) -> Option<PathBuf> {
    if transcript.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return None;
    }
    let dir_name = transcript.parent()?.file_name()?.to_str()?;
    decode_project_dir_name(dir_name)
}

/// Whether `dir` is a managed worktree: strictly under the workspace root
/// and carrying a `.git` entry.
pub fn is_worktree_dir(workspace_dir: &Path, dir: &Path) -> bool {
    if !dir.starts_with(workspace_dir) || dir == workspace_dir {
        return false;
    }
    dir.join(".git").exists()
}
