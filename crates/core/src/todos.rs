//! Task-list extraction from agent session transcripts.
//!
//! Transcripts are JSONL; each line is an independent JSON document. The
//! agent records its task list through `TodoWrite` tool invocations, so the
//! current list for a worktree is the `todos` array of the *last* such
//! invocation in the most recently written session file.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Progress state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl Default for TodoStatus {
    fn default() -> Self {
        TodoStatus::Pending
    }
}

/// One entry of the agent's task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "activeForm")]
    pub active_form: Option<String>,
}

/// Encode a worktree path into its transcript directory name.
///
/// `/workspace/foo/alpha` → `-workspace-foo-alpha`.
pub fn encode_project_dir_name(worktree_path: &Path) -> String {
    worktree_path.to_string_lossy().replace('/', "-")
}

/// Return the latest recorded task list for a worktree, or an empty list
/// when no transcript mentions one.
pub fn latest_todos(projects_dir: &Path, worktree_path: &Path) -> Vec<TodoItem> {
    let project_dir = projects_dir.join(encode_project_dir_name(worktree_path));
    let Some(transcript) = newest_transcript(&project_dir) else {
        return Vec::new();
    };
    latest_todos_in_file(&transcript)
}

/// Pick the most recently modified `.jsonl` file in a project directory.
fn newest_transcript(project_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(project_dir).ok()?;
    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if newest.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
            newest = Some((path, modified));
        }
    }

    newest.map(|(path, _)| path)
}

/// Scan a transcript and return the `todos` payload of the last `TodoWrite`
/// invocation. Malformed lines are skipped.
pub fn latest_todos_in_file(transcript: &Path) -> Vec<TodoItem> {
    let file = match std::fs::File::open(transcript) {
        Ok(file) => file,
        Err(err) => {
            debug!(path = %transcript.display(), error = %err, "could not open transcript");
            return Vec::new();
        }
    };

    let mut latest = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        if let Some(todos) = todos_from_line(&value) {
            latest = todos;
        }
    }
    latest
}

/// Pull the `todos` array out of one transcript line, if it carries a
/// `TodoWrite` tool invocation.
fn todos_from_line(value: &serde_json::Value) -> Option<Vec<TodoItem>> {
    let content = value.get("message")?.get("content")?.as_array()?;
    for block in content {
        if block.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
            continue;
        }
        if block.get("name").and_then(|n| n.as_str()) != Some("TodoWrite") {
            continue;
        }
        let todos = block.get("input")?.get("todos")?;
        return serde_json::from_value(todos.clone()).ok();
    }
    None
}
