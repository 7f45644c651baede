//! Audit log sinks.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::audit::record::{error_line, AuditRecord};

/// Destination for finished audit records.
///
/// Implementations must tolerate concurrent callers; each record is written
/// as one whole line.
pub trait AuditLog: Send + Sync {
    fn record(&self, record: AuditRecord);

    /// Note why a session failed. Written alongside the session's record,
    /// never instead of it.
    fn error(&self, client: SocketAddr, detail: &str);
}

/// Append-only audit file.
#[derive(Debug)]
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<LineWriter<File>>,
}

impl FileAuditLog {
    /// Open (or create) the audit file, creating parent directories.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        tracing::info!(path = ?path, "Audit log opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LineWriter::new(file)),
        })
    }

    fn write_line(&self, line: &dyn std::fmt::Display) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{}", line) {
            tracing::error!(path = ?self.path, error = %e, "Failed to write audit line");
        }
    }
}

impl AuditLog for FileAuditLog {
    fn record(&self, record: AuditRecord) {
        self.write_line(&record);
    }

    fn error(&self, client: SocketAddr, detail: &str) {
        self.write_line(&error_line(client, detail));
    }
}

/// In-memory audit log, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
    errors: Mutex<Vec<String>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Rendered lines, in emission order.
    pub fn lines(&self) -> Vec<String> {
        self.records().iter().map(ToString::to_string).collect()
    }

    /// Rendered `ERROR` lines, in emission order.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    fn error(&self, client: SocketAddr, detail: &str) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(error_line(client, detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(port: u16) -> AuditRecord {
        let client = format!("10.0.0.1:{}", port).parse().unwrap();
        AuditRecord::malformed(client, "test")
    }

    #[test]
    fn file_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("proxy.log");

        let log = FileAuditLog::open(&path).unwrap();
        log.record(sample(1));
        log.record(sample(2));
        drop(log);

        let log = FileAuditLog::open(&path).unwrap();
        log.record(sample(3));
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("10.0.0.1:1 BLOCKED -"));
        assert!(lines[2].contains("10.0.0.1:3 BLOCKED -"));
    }

    #[test]
    fn file_log_records_error_detail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.log");
        let client: SocketAddr = "10.0.0.1:7".parse().unwrap();

        let log = FileAuditLog::open(&path).unwrap();
        log.error(client, "origin connect timed out after 5s");
        log.record(AuditRecord::empty(client));
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" 10.0.0.1:7 ERROR origin connect timed out after 5s"));
        assert!(lines[1].ends_with(" 10.0.0.1:7 BLOCKED -"));
    }

    #[test]
    fn concurrent_writers_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.log");
        let log = Arc::new(FileAuditLog::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.record(sample(1000 + t * 100 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 400);
        assert!(content.lines().all(|l| l.ends_with(" BLOCKED -")));
    }

    #[test]
    fn memory_log_keeps_order() {
        let log = MemoryAuditLog::new();
        log.record(sample(1));
        log.record(sample(2));
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].client().port(), 2);
    }
}
