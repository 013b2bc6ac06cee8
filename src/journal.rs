//! Append-only JSONL record of downloads and uploads.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::transfer::Direction;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JournalEntry {
    pub timestamp: String,
    pub transfer_id: String,
    pub direction: Direction,
    pub remote: String,
    pub local: PathBuf,
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

impl JournalEntry {
    pub fn new(direction: Direction, remote: &str, local: &Path) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            transfer_id: uuid::Uuid::new_v4().to_string(),
            direction,
            remote: remote.to_string(),
            local: local.to_path_buf(),
            status: TransferStatus::Completed,
            bytes_transferred: 0,
            error: None,
        }
    }

    pub fn completed(mut self, bytes: u64) -> Self {
        self.status = TransferStatus::Completed;
        self.bytes_transferred = bytes;
        self
    }

    pub fn failed(mut self, error: &str) -> Self {
        self.status = TransferStatus::Failed;
        self.error = Some(error.to_string());
        self
    }
}

pub struct TransferJournal {
    path: PathBuf,
}

impl TransferJournal {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_entry(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open transfer journal")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).context("Failed to open transfer journal for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TransferJournal::new(dir.path().join("journal.jsonl"));
        assert!(journal.read().unwrap().is_empty());

        let ok = JournalEntry::new(Direction::Download, "ftp://h/a.txt", Path::new("a.txt"))
            .completed(42);
        let bad = JournalEntry::new(Direction::Upload, "ftp://h/b.txt", Path::new("b.txt"))
            .failed("server replied 553: not allowed");
        journal.add_entry(&ok).unwrap();
        journal.add_entry(&bad).unwrap();

        let entries = journal.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, TransferStatus::Completed);
        assert_eq!(entries[0].bytes_transferred, 42);
        assert_eq!(entries[1].direction, Direction::Upload);
        assert_eq!(entries[1].error.as_deref(), Some("server replied 553: not allowed"));
        assert_ne!(entries[0].transfer_id, entries[1].transfer_id);
    }
}
