//! Worktree lifecycle and checkpoint engine.
//!
//! The supervisor watches two event sources — an append-only title event log
//! and the agent's session transcripts — plus direct programmatic
//! notifications, and turns them into an eventually-consistent set of
//! committed, properly-named git branches with per-worktree session
//! metadata. State the UI reads lives in the [`registry::WorktreeRegistry`]
//! and is persisted as a crash-safe JSON snapshot.

pub mod checkpoint;
pub mod cleanup;
pub mod graduate;
pub mod ingest;
pub mod registry;
pub mod session;
pub mod status;
pub mod supervisor;
pub mod tasks;
pub mod todo_watcher;

pub use graduate::GraduateError;
pub use registry::{Repository, Worktree, WorktreePatch, WorktreeRegistry};
pub use session::{SessionEntry, SessionStore};
pub use supervisor::Supervisor;
