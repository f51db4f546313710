use chrono::{Local, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of daily log files kept on disk.
const KEEP_LOG_FILES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub message: String,
}

/// The user-facing mirror log.
///
/// Fire-and-forget: `write_line` never blocks meaningfully and never fails
/// the calling operation. Disabled logs drop everything. Entries land in a
/// bounded in-memory ring for the display layer and, when a log directory is
/// configured, in a rotating daily file.
#[derive(Clone)]
pub struct MirrorLog {
    inner: Arc<Inner>,
}

struct Inner {
    enabled: bool,
    max_entries: usize,
    buffer: Mutex<VecDeque<LogEntry>>,
    log_dir: Option<PathBuf>,
}

impl MirrorLog {
    pub fn new(enabled: bool) -> Self {
        Self::build(enabled, None)
    }

    pub fn with_log_dir(enabled: bool, log_dir: impl Into<PathBuf>) -> Self {
        Self::build(enabled, Some(log_dir.into()))
    }

    fn build(enabled: bool, log_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled,
                max_entries: 1000,
                buffer: Mutex::new(VecDeque::new()),
                log_dir,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn write_line(&self, message: impl Into<String>) {
        if !self.inner.enabled {
            return;
        }
        let message = message.into();

        {
            let mut buffer = self.inner.buffer.lock();
            if buffer.len() >= self.inner.max_entries {
                buffer.pop_front();
            }
            buffer.push_back(LogEntry {
                timestamp: Utc::now().timestamp(),
                message: message.clone(),
            });
        }

        if let Some(dir) = &self.inner.log_dir {
            let _ = append_to_daily_file(dir, &message);
        }
    }

    pub fn entries(&self, limit: Option<usize>) -> Vec<LogEntry> {
        let buffer = self.inner.buffer.lock();
        match limit {
            Some(n) => buffer.iter().rev().take(n).rev().cloned().collect(),
            None => buffer.iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        self.inner.buffer.lock().clear();
    }
}

/// Default on-disk location for the daily mirror logs.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartsync")
        .join("logs")
}

fn append_to_daily_file(dir: &Path, message: &str) -> std::io::Result<()> {
    use std::io::Write;

    let now = Local::now();
    let filename = dir.join(now.format("%-d.%-m.%Y.log").to_string());
    if !filename.exists() {
        std::fs::create_dir_all(dir)?;
        prune_old_files(dir);
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)?;
    writeln!(file, "{} - {}", now.format("%Y-%m-%d %H:%M:%S"), message)
}

/// Keep only the newest daily files, by modification time.
fn prune_old_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in files.into_iter().skip(KEEP_LOG_FILES.saturating_sub(1)) {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_drops_everything() {
        let log = MirrorLog::new(false);
        log.write_line("ignored");
        assert!(log.entries(None).is_empty());
    }

    #[test]
    fn ring_buffer_keeps_most_recent() {
        let log = MirrorLog::new(true);
        for i in 0..1005 {
            log.write_line(format!("line {i}"));
        }
        let entries = log.entries(None);
        assert_eq!(entries.len(), 1000);
        assert_eq!(entries.last().unwrap().message, "line 1004");
        assert_eq!(entries.first().unwrap().message, "line 5");
    }

    #[test]
    fn limit_returns_newest_entries_in_order() {
        let log = MirrorLog::new(true);
        log.write_line("first");
        log.write_line("second");
        log.write_line("third");
        let entries = log.entries(Some(2));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "third");
    }

    #[test]
    fn writes_daily_file_when_directory_configured() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let log = MirrorLog::with_log_dir(true, dir.path());
        log.write_line("persisted");

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read log dir")
            .flatten()
            .collect();
        assert_eq!(files.len(), 1);
        let contents = std::fs::read_to_string(files[0].path()).expect("read log file");
        assert!(contents.contains("persisted"));
    }
}
