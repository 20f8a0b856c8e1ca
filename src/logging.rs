use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

pub const DEFAULT_LOG_FILE: &str = "logs/tunnels.log";

const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;
const BACKUP_COUNT: u32 = 5;

/// Sink for the one-line-per-event run log. Constructed explicitly and handed
/// to the engine, so tests can capture events in memory instead.
pub trait EventLog {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Append-only log file with size- and count-bounded rotation: when a write
/// would cross the size limit, `tunnels.log` becomes `tunnels.log.1`,
/// `.1` becomes `.2`, and so on; the oldest backup falls off the end.
///
/// The file itself is opened lazily on first write and reused afterwards.
pub struct RotatingFileLog {
    path: PathBuf,
    max_size: u64,
    backups: u32,
    file: Mutex<Option<File>>,
}

impl RotatingFileLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_limits(path, MAX_LOG_SIZE, BACKUP_COUNT)
    }

    pub fn with_limits(path: impl Into<PathBuf>, max_size: u64, backups: u32) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            max_size,
            backups,
            file: Mutex::new(None),
        })
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        PathBuf::from(format!("{}.{n}", self.path.display()))
    }

    fn rotate(&self) {
        if self.backups == 0 {
            let _ = fs::remove_file(&self.path);
            return;
        }
        for n in (1..self.backups).rev() {
            let _ = fs::rename(self.backup_path(n), self.backup_path(n + 1));
        }
        let _ = fs::rename(&self.path, self.backup_path(1));
    }

    // Logging is best effort: a failed write must not fail the run.
    fn append(&self, message: &str) {
        let line = format!(
            "{} - {message}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f")
        );
        let Ok(mut slot) = self.file.lock() else {
            return;
        };

        if self.max_size > 0 {
            let size = slot
                .as_ref()
                .and_then(|file| file.metadata().ok())
                .map(|meta| meta.len())
                .or_else(|| fs::metadata(&self.path).ok().map(|meta| meta.len()))
                .unwrap_or(0);
            if size + line.len() as u64 >= self.max_size {
                *slot = None;
                self.rotate();
            }
        }

        if slot.is_none() {
            *slot = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .ok();
        }
        if let Some(file) = slot.as_mut() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

impl EventLog for RotatingFileLog {
    fn info(&self, message: &str) {
        self.append(message);
    }

    fn error(&self, message: &str) {
        self.append(message);
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    fn push(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}

impl EventLog for MemoryLog {
    fn info(&self, message: &str) {
        self.push(message);
    }

    fn error(&self, message: &str) {
        self.push(message);
    }
}
