//! Title event parsing and normalization.
//!
//! Title changes arrive from two places: the append-only title event log
//! written by the terminal-title interceptor, and direct notifications from
//! PTY-side detectors. Both funnel through the same normalization so the
//! downstream dedup can match them up.

use std::path::PathBuf;

/// Where a title event was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TitleSource {
    /// Read from the tailed title event log.
    Log,
    /// Injected directly by a PTY-side detector.
    Pty,
}

impl std::fmt::Display for TitleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TitleSource::Log => f.write_str("log"),
            TitleSource::Pty => f.write_str("pty"),
        }
    }
}

/// A normalized title change for one worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleEvent {
    pub cwd: PathBuf,
    pub title: String,
    pub source: TitleSource,
}

/// One raw record from the title event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleLogLine {
    /// Opaque timestamp string, passed through to logs only.
    pub timestamp: String,
    /// Opaque pid string, passed through to logs only.
    pub pid: String,
    pub cwd: PathBuf,
    pub title: String,
}

/// Strip decoration from a raw terminal title.
///
/// Removes every `✳` glyph, trims whitespace, then strips at most one
/// leading `*` and trims again. An empty result means the event should be
/// dropped.
pub fn clean_title(title: &str) -> String {
    let cleaned = title.replace('✳', "");
    let cleaned = cleaned.trim();
    cleaned.strip_prefix('*').unwrap_or(cleaned).trim().to_string()
}

/// Parse one line of the title event log: `timestamp|pid|cwd|title`.
///
/// Lines that do not split into exactly four pipe-separated fields are
/// rejected; there is no escaping in the format.
pub fn parse_log_line(line: &str) -> Option<TitleLogLine> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 4 {
        return None;
    }

    Some(TitleLogLine {
        timestamp: parts[0].to_string(),
        pid: parts[1].to_string(),
        cwd: PathBuf::from(parts[2]),
        title: parts[3].to_string(),
    })
}
