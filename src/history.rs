// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Command history and capped in-memory logs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::Result;

/// A single processed command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub time: DateTime<Utc>,
    pub command: String,
    pub response: String,
    #[serde(default)]
    pub intent: Option<String>,
}

/// Create a new command record stamped with the current time
pub fn create_record(command: &str, response: &str, intent: Option<String>) -> CommandRecord {
    CommandRecord {
        id: uuid::Uuid::new_v4().to_string(),
        time: Utc::now(),
        command: command.to_string(),
        response: response.to_string(),
        intent,
    }
}

/// In-memory list that keeps only the most recent `capacity` entries
#[derive(Debug, Clone)]
pub struct RingLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, dropping the oldest when over capacity
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Change the capacity, trimming the oldest entries if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything, returning the number of dropped entries
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> RingLog<T> {
    /// The last `count` entries in chronological order (all when `count` is 0)
    pub fn tail(&self, count: usize) -> Vec<T> {
        let skip = if count == 0 { 0 } else { self.entries.len().saturating_sub(count) };
        self.entries.iter().skip(skip).cloned().collect()
    }
}

/// JSONL-backed command history, capped at `limit` entries.
///
/// Appends, compaction and clearing are serialized through `file_lock`.
pub struct History {
    path: PathBuf,
    limit: usize,
    file_lock: Mutex<()>,
}

impl History {
    /// Create a new history manager
    pub fn new(path: PathBuf, limit: usize) -> Self {
        Self {
            path,
            limit: limit.max(1),
            file_lock: Mutex::new(()),
        }
    }

    fn lock_file(&self) -> MutexGuard<'_, ()> {
        self.file_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry to the history, compacting the file when it
    /// grows past the limit
    pub fn append(&self, record: &CommandRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let line = format!("{}\n", serde_json::to_string(record)?);
        let _guard = self.lock_file();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())?;
        }

        let entries = self.read_entries()?;
        if entries.len() > self.limit {
            let keep = &entries[entries.len() - self.limit..];
            self.rewrite(keep)?;
        }

        Ok(())
    }

    /// Read all history entries, oldest first
    pub fn read_all(&self) -> Result<Vec<CommandRecord>> {
        let _guard = self.lock_file();
        self.read_entries()
    }

    fn read_entries(&self) -> Result<Vec<CommandRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<CommandRecord>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock_file();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn rewrite(&self, entries: &[CommandRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        for entry in entries {
            let json = serde_json::to_string(entry)?;
            writeln!(tmp, "{}", json)?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_log_caps_at_capacity() {
        let mut log = RingLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.tail(0), vec![2, 3, 4]);
        assert_eq!(log.tail(2), vec![3, 4]);
        assert_eq!(log.tail(10), vec![2, 3, 4]);
    }

    #[test]
    fn test_ring_log_shrink_and_clear() {
        let mut log = RingLog::new(5);
        for i in 0..5 {
            log.push(i);
        }
        log.set_capacity(2);
        assert_eq!(log.tail(0), vec![3, 4]);
        assert_eq!(log.clear(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_history_truncates_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("data").join("history.jsonl"), 50);

        for i in 0..60 {
            history.append(&create_record(&format!("cmd {}", i), "ok", None)).unwrap();
        }

        let all = history.read_all().unwrap();
        assert_eq!(all.len(), 50);
        assert_eq!(all.first().unwrap().command, "cmd 10");
        assert_eq!(all.last().unwrap().command, "cmd 59");
    }

    #[test]
    fn test_history_recent_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"), 10);
        for cmd in ["one", "two", "three"] {
            history.append(&create_record(cmd, "ok", Some("unknown".to_string()))).unwrap();
        }

        let recent = history.get_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].command, "three");
        assert_eq!(recent[1].command, "two");
    }

    #[test]
    fn test_history_skips_corrupt_lines_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = History::new(path.clone(), 10);
        history.append(&create_record("hello", "hi", None)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{{garbage"))
            .unwrap();

        assert_eq!(history.read_all().unwrap().len(), 1);
        history.clear().unwrap();
        assert!(history.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_all_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let history = std::sync::Arc::new(History::new(dir.path().join("history.jsonl"), 100_000));

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let history = std::sync::Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let record = create_record(&format!("cmd {} {}", worker, i), "ok", None);
                        history.append(&record).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(history.read_all().unwrap().len(), 200);
    }

    #[test]
    fn test_concurrent_appends_respect_limit() {
        let dir = tempfile::tempdir().unwrap();
        let history = std::sync::Arc::new(History::new(dir.path().join("history.jsonl"), 10));

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let history = std::sync::Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        history.append(&create_record(&format!("{}-{}", worker, i), "ok", None)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(history.read_all().unwrap().len(), 10);
    }
}
