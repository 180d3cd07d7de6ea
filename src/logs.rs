//! Run log naming and cleanup.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PREFIX: &str = "log_";
const EXTENSION: &str = ".log";

/// File name of the log for a run started at `started`, e.g.
/// `log_20240315_093000.log`.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{PREFIX}{}{EXTENSION}", started.format("%Y%m%d_%H%M%S"))
}

/// Run log opened on the first write, so a run that logs nothing leaves no
/// file behind. Parent directories are created at that point.
#[derive(Debug)]
pub struct LazyLogFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyLogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(f) => f,
            None => {
                if let Some(dir) = self.path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?
            }
        };
        Ok(self.file.insert(file))
    }
}

impl Write for LazyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

fn is_run_log(name: &str) -> bool {
    name.starts_with(PREFIX) && name.ends_with(EXTENSION)
}

/// Deletes the run logs in `dir` and returns how many were removed.
///
/// Other files are left alone. A missing directory counts as empty.
pub fn delete_logs(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        info!(dir = %dir.display(), "Log directory does not exist, nothing to delete");
        return Ok(0);
    }

    let mut deleted = 0;
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("reading log directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_run_log);
        if path.is_file() && is_log {
            std::fs::remove_file(&path)
                .with_context(|| format!("deleting {}", path.display()))?;
            debug!(path = %path.display(), "Log deleted");
            deleted += 1;
        }
    }

    info!(deleted, dir = %dir.display(), "Logs deleted");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    #[test]
    fn test_log_file_name() {
        let t = Local.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap();
        assert_eq!(log_file_name(t), "log_20240315_093000.log");
    }

    #[test]
    fn test_delete_logs_only_removes_run_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("log_20240315_093000.log"), "{}").unwrap();
        fs::write(dir.path().join("log_20240316_093000.log"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(delete_logs(dir.path()).unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(delete_logs(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_lazy_log_file_created_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("log_20240315_093000.log");
        let mut log = LazyLogFile::new(&path);

        log.flush().unwrap();
        assert!(!path.exists());

        log.write_all(b"{\"level\":\"WARN\"}\n").unwrap();
        log.write_all(b"{\"level\":\"ERROR\"}\n").unwrap();
        log.flush().unwrap();
        assert_eq!(fs::read_to_string(log.path()).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_delete_logs_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(delete_logs(&dir.path().join("absent")).unwrap(), 0);
    }
}
