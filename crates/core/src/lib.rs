//! Core types and pure logic for the catnip workspace supervisor.
//!
//! This crate has no knowledge of git or filesystem watchers. It holds the
//! pieces the rest of the workspace composes: configuration, title-event
//! parsing and normalization, the transcript path codec, todo extraction
//! from agent session transcripts, and the LLM completion client.

pub mod config;
pub mod llm;
pub mod paths;
pub mod title;
pub mod todos;

pub use config::SupervisorConfig;
pub use title::{clean_title, parse_log_line, TitleEvent, TitleSource};
pub use todos::{TodoItem, TodoStatus};
