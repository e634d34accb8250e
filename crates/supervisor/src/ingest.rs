//! Title event ingestion: the log tailer and cross-source deduplication.
//!
//! Two inputs produce title events — the tailed append-only log and direct
//! PTY-side notifications. Both are normalized, filtered to worktree-valid
//! directories, deduplicated across sources, and forwarded to the
//! supervisor's routing channel in arrival order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use catnip_core::paths::is_worktree_dir;
use catnip_core::title::{clean_title, parse_log_line, TitleEvent, TitleSource};

/// Entries older than this are evicted from the dedup map.
const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// A pty event arriving this soon after any recorded event with the same
/// key is treated as the same title change seen twice.
const CROSS_SOURCE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
struct RecentEvent {
    at: Instant,
    source: TitleSource,
}

/// Normalizes, filters, deduplicates, and forwards title events.
pub struct TitleIngestor {
    log_path: PathBuf,
    workspace_dir: PathBuf,
    /// Byte offset of the next unread log position.
    offset: Mutex<u64>,
    recent: Mutex<HashMap<(PathBuf, String), RecentEvent>>,
    events: mpsc::Sender<TitleEvent>,
}

impl TitleIngestor {
    pub fn new(
        log_path: impl Into<PathBuf>,
        workspace_dir: impl Into<PathBuf>,
        events: mpsc::Sender<TitleEvent>,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            workspace_dir: workspace_dir.into(),
            offset: Mutex::new(0),
            recent: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Read everything appended to the log since the last call and offer
    /// each record downstream. The first call consumes the startup backlog.
    ///
    /// When the file shrinks below the stored offset (rotation/truncation)
    /// the cursor resets to 0 and the file is re-read; the dedup window
    /// absorbs the replayed tail.
    pub async fn drain_log(&self) {
        let offset = *lock(&self.offset);

        let mut file = match tokio::fs::File::open(&self.log_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!(path = %self.log_path.display(), error = %err, "failed to open title log");
                return;
            }
        };

        let len = match file.metadata().await {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                warn!(path = %self.log_path.display(), error = %err, "failed to stat title log");
                return;
            }
        };

        let offset = if len < offset {
            debug!(path = %self.log_path.display(), "title log shrank, resetting cursor");
            0
        } else {
            offset
        };
        if len == offset {
            *lock(&self.offset) = offset;
            return;
        }

        if let Err(err) = file.seek(std::io::SeekFrom::Start(offset)).await {
            warn!(path = %self.log_path.display(), error = %err, "failed to seek title log");
            return;
        }
        let mut buf = Vec::with_capacity((len - offset) as usize);
        if let Err(err) = file.read_to_end(&mut buf).await {
            warn!(path = %self.log_path.display(), error = %err, "failed to read title log");
            return;
        }

        // Only complete lines advance the cursor; a partial trailing line is
        // picked up once its newline arrives.
        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            *lock(&self.offset) = offset;
            return;
        };
        let complete = &buf[..=last_newline];
        *lock(&self.offset) = offset + complete.len() as u64;

        let text = String::from_utf8_lossy(complete);
        for line in text.lines().filter(|l| !l.is_empty()) {
            let Some(record) = parse_log_line(line) else {
                warn!(line, "invalid title log entry, skipping");
                continue;
            };
            debug!(
                timestamp = %record.timestamp,
                pid = %record.pid,
                cwd = %record.cwd.display(),
                title = %record.title,
                "title change observed in log"
            );
            self.offer(&record.cwd, &record.title, TitleSource::Log).await;
        }
    }

    /// Normalize and forward one title observation (from either source).
    pub async fn offer(&self, cwd: &Path, raw_title: &str, source: TitleSource) {
        let title = clean_title(raw_title);
        if title.is_empty() {
            return;
        }
        if !is_worktree_dir(&self.workspace_dir, cwd) {
            return;
        }
        if !self.should_forward(cwd, &title, source, Instant::now()) {
            return;
        }

        let event = TitleEvent {
            cwd: cwd.to_path_buf(),
            title,
            source,
        };
        if self.events.send(event).await.is_err() {
            debug!("title event channel closed, dropping event");
        }
    }

    /// Cross-source dedup. Forwarding order equals ingestion order: callers
    /// run on the two source loops and the surviving events share one
    /// routing channel.
    fn should_forward(&self, cwd: &Path, title: &str, source: TitleSource, now: Instant) -> bool {
        let key = (cwd.to_path_buf(), title.to_string());
        let mut recent = lock(&self.recent);

        recent.retain(|_, event| now.saturating_duration_since(event.at) <= DEDUP_WINDOW);

        if let Some(existing) = recent.get(&key) {
            if source == TitleSource::Log && existing.source == TitleSource::Log {
                return false;
            }
            if source == TitleSource::Pty
                && now.saturating_duration_since(existing.at) < CROSS_SOURCE_WINDOW
            {
                return false;
            }
        }

        recent.insert(key, RecentEvent { at: now, source });
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestor() -> (TitleIngestor, mpsc::Receiver<TitleEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let tmp = std::env::temp_dir();
        (
            TitleIngestor::new(tmp.join("titles.log"), "/workspace", tx),
            rx,
        )
    }

    const WT: &str = "/workspace/foo/alpha";

    #[test]
    fn log_replay_is_dropped() {
        let (ingestor, _rx) = ingestor();
        let now = Instant::now();
        let wt = Path::new(WT);

        assert!(ingestor.should_forward(wt, "Refactor cache", TitleSource::Log, now));
        assert!(!ingestor.should_forward(wt, "Refactor cache", TitleSource::Log, now));
        // Even near the window edge a log/log pair stays deduplicated.
        assert!(!ingestor.should_forward(
            wt,
            "Refactor cache",
            TitleSource::Log,
            now + Duration::from_secs(4)
        ));
    }

    #[test]
    fn pty_echo_within_two_seconds_is_dropped() {
        let (ingestor, _rx) = ingestor();
        let now = Instant::now();
        let wt = Path::new(WT);

        assert!(ingestor.should_forward(wt, "Refactor cache", TitleSource::Log, now));
        assert!(!ingestor.should_forward(
            wt,
            "Refactor cache",
            TitleSource::Pty,
            now + Duration::from_millis(500)
        ));
    }

    #[test]
    fn pty_after_two_seconds_is_forwarded() {
        let (ingestor, _rx) = ingestor();
        let now = Instant::now();
        let wt = Path::new(WT);

        assert!(ingestor.should_forward(wt, "Refactor cache", TitleSource::Log, now));
        assert!(ingestor.should_forward(
            wt,
            "Refactor cache",
            TitleSource::Pty,
            now + Duration::from_secs(3)
        ));
    }

    #[test]
    fn log_after_pty_is_forwarded() {
        let (ingestor, _rx) = ingestor();
        let now = Instant::now();
        let wt = Path::new(WT);

        assert!(ingestor.should_forward(wt, "Refactor cache", TitleSource::Pty, now));
        assert!(ingestor.should_forward(
            wt,
            "Refactor cache",
            TitleSource::Log,
            now + Duration::from_millis(500)
        ));
    }

    #[test]
    fn entries_evict_after_five_seconds() {
        let (ingestor, _rx) = ingestor();
        let now = Instant::now();
        let wt = Path::new(WT);

        assert!(ingestor.should_forward(wt, "Refactor cache", TitleSource::Log, now));
        assert!(ingestor.should_forward(
            wt,
            "Refactor cache",
            TitleSource::Log,
            now + Duration::from_secs(6)
        ));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let (ingestor, _rx) = ingestor();
        let now = Instant::now();

        assert!(ingestor.should_forward(Path::new(WT), "A", TitleSource::Log, now));
        assert!(ingestor.should_forward(Path::new(WT), "B", TitleSource::Log, now));
        assert!(ingestor.should_forward(Path::new("/workspace/foo/beta"), "A", TitleSource::Log, now));
    }

    #[tokio::test]
    async fn drain_log_parses_and_tracks_offset() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = tmp.path().join("workspace");
        let wt = workspace.join("foo").join("alpha");
        std::fs::create_dir_all(wt.join(".git")).unwrap();
        let log_path = tmp.path().join("title_events.log");

        let (tx, mut rx) = mpsc::channel(16);
        let ingestor = TitleIngestor::new(&log_path, &workspace, tx);

        // No log file yet: nothing happens.
        ingestor.drain_log().await;

        let line = format!("1700000000|42|{}|✳ Add login flow\n", wt.display());
        std::fs::write(&log_path, &line).unwrap();
        ingestor.drain_log().await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.cwd, wt);
        assert_eq!(event.title, "Add login flow");
        assert_eq!(event.source, TitleSource::Log);

        // Draining again without new content forwards nothing.
        ingestor.drain_log().await;
        assert!(rx.try_recv().is_err());

        // Appended entries are picked up from the stored offset; invalid
        // lines and non-worktree directories are skipped.
        let mut appended = String::new();
        appended.push_str("garbage line without pipes\n");
        appended.push_str("1700000001|42|/elsewhere|Not a worktree\n");
        appended.push_str(&format!("1700000002|42|{}|Wire up session store\n", wt.display()));
        std::fs::write(
            &log_path,
            format!("{line}{appended}"),
        )
        .unwrap();
        ingestor.drain_log().await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.title, "Wire up session store");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drain_log_resets_on_truncation() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = tmp.path().join("workspace");
        let wt = workspace.join("foo").join("alpha");
        std::fs::create_dir_all(wt.join(".git")).unwrap();
        let log_path = tmp.path().join("title_events.log");

        let (tx, mut rx) = mpsc::channel(16);
        let ingestor = TitleIngestor::new(&log_path, &workspace, tx);

        std::fs::write(
            &log_path,
            format!("1|1|{}|A title that is long enough\n", wt.display()),
        )
        .unwrap();
        ingestor.drain_log().await;
        assert!(rx.try_recv().is_ok());

        // Rotate: new, shorter file. Cursor resets and the new entry flows.
        std::fs::write(&log_path, format!("2|1|{}|Short\n", wt.display())).unwrap();
        ingestor.drain_log().await;
        let event = rx.try_recv().unwrap();
        assert_eq!(event.title, "Short");
    }

    #[tokio::test]
    async fn partial_trailing_line_waits_for_newline() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = tmp.path().join("workspace");
        let wt = workspace.join("foo").join("alpha");
        std::fs::create_dir_all(wt.join(".git")).unwrap();
        let log_path = tmp.path().join("title_events.log");

        let (tx, mut rx) = mpsc::channel(16);
        let ingestor = TitleIngestor::new(&log_path, &workspace, tx);

        let partial = format!("1|1|{}|Half a ti", wt.display());
        std::fs::write(&log_path, &partial).unwrap();
        ingestor.drain_log().await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&log_path, format!("{partial}tle\n")).unwrap();
        ingestor.drain_log().await;
        assert_eq!(rx.try_recv().unwrap().title, "Half a title");
    }
}
