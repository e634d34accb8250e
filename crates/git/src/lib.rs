//! Typed async facade over the git CLI.
//!
//! Every operation takes a working directory and shells out to `git`; failed
//! invocations are classified into [`GitError`] variants so callers can
//! pattern-match on kinds instead of scraping stderr themselves. Substring
//! matching against git's well-known messages happens only in this crate.

pub mod error;
pub mod exec;
pub mod names;
pub mod ops;
pub mod strategy;

pub use error::GitError;
pub use exec::run_git;
pub use names::{
    clean_branch_listing_name, generate_session_name, is_scratch_branch, validate_branch_name,
    SCRATCH_PREFIX,
};
pub use ops::{ListBranchesOptions, WorktreeEntry};
pub use strategy::{FetchStrategy, PushStrategy};
