#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging for the summarization stack.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-stage diagnostics.
    Debug,
    /// Lifecycle events.
    Info,
    /// Recovered failures (fallbacks, degraded sections).
    Warn,
    /// Failures that abort a run.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted message key, e.g. `summarizer.section.degraded`.
    pub message: String,
    /// Arbitrary JSON fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Adds a single metadata field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merges every field of a JSON object into the metadata; other values are ignored.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &serde_json::Value) -> Self {
        if let Some(obj) = metadata.as_object() {
            for (key, value) in obj {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

/// Thread-safe JSON logger with append-only semantics and a level floor.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    min_level: LogLevel,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path, recording every level.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_min_level(path, LogLevel::Debug)
    }

    /// Creates a logger that drops records below `min_level`.
    pub fn with_min_level(path: impl AsRef<Path>, min_level: LogLevel) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            path,
            min_level,
            writer: Mutex::new(file),
        })
    }

    /// Returns whether a record at `level` would be written.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Writes a log record as a JSON line when its level passes the floor.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if !self.enabled(record.level) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every record from a JSON-lines log, skipping blank lines.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("reading log {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("parsing {} line {}", path.display(), idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("summarizer.log")).unwrap();
        logger
            .log(
                &LogRecord::new("summarizer", LogLevel::Info, "summarizer.run.start")
                    .with_field("sections", 3),
            )
            .unwrap();
        let records = read_records(logger.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "summarizer.run.start");
        assert_eq!(records[0].metadata["sections"], 3);
    }

    #[test]
    fn level_floor_drops_debug_records() {
        let dir = tempdir().unwrap();
        let logger =
            JsonLogger::with_min_level(dir.path().join("nested/run.log"), LogLevel::Warn).unwrap();
        logger
            .log(&LogRecord::new("summarizer", LogLevel::Debug, "noise"))
            .unwrap();
        logger
            .log(&LogRecord::new("summarizer", LogLevel::Warn, "summarizer.section.degraded"))
            .unwrap();
        let records = read_records(logger.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Warn);
    }

    #[test]
    fn metadata_merge_ignores_non_objects() {
        let record = LogRecord::new("m", LogLevel::Info, "x")
            .with_metadata(&serde_json::json!({ "a": 1 }))
            .with_metadata(&serde_json::json!([1, 2]));
        assert_eq!(record.metadata.len(), 1);
    }
}
