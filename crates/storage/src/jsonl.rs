// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `events.jsonl` projection of the event log.
//!
//! SQLite is the source of truth; this file is a line-per-event mirror the
//! git sync layer can commit and peers can replay. On open the mirror is
//! reconciled with the events table and rebuilt when it disagrees (the
//! corrupt file is kept aside as `events.jsonl.corrupt`).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thrum_core::EventRecord;
use tracing::warn;

use crate::error::StoreError;

/// Append-only writer for the JSON-lines mirror.
pub(crate) struct EventLog {
    path: PathBuf,
    file: File,
}

impl EventLog {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), file })
    }

    /// Append one record and fsync.
    pub fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Replace the file contents with `records`, atomically (temp + rename).
    pub fn rebuild(&mut self, records: &[EventRecord]) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = File::create(&tmp)?;
            for record in records {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                out.write_all(&line)?;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    /// Move the current file aside as `.corrupt`, keeping a backup.
    pub fn quarantine(&mut self) -> Result<(), StoreError> {
        let backup = self.path.with_extension("jsonl.corrupt");
        if self.path.exists() {
            std::fs::rename(&self.path, &backup)?;
            warn!(path = %self.path.display(), backup = %backup.display(), "quarantined corrupt event log");
        }
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    /// Number of parseable lines, or `None` when any line fails to parse.
    pub fn line_count(&self) -> Result<Option<u64>, StoreError> {
        if !self.path.exists() {
            return Ok(Some(0));
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut count = 0u64;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<EventRecord>(&line).is_err() {
                return Ok(None);
            }
            count += 1;
        }
        Ok(Some(count))
    }
}

/// Read every record from a JSON-lines event file.
///
/// Blank lines are skipped; a malformed line fails the whole read so the
/// caller can decide whether to quarantine.
pub fn read_event_log(path: &Path) -> Result<Vec<EventRecord>, StoreError> {
    let mut records = Vec::new();
    if !path.exists() {
        return Ok(records);
    }
    let reader = BufReader::new(File::open(path)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord = serde_json::from_str(&line).map_err(|e| {
            StoreError::Corrupt(format!("{}:{}: {}", path.display(), lineno + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
