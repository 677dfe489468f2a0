//! Day-partitioned log files and retention rotation.

use chrono::NaiveDate;
use forge_types::AuditEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::redact::redacted_json;
use crate::shadow::{ShadowEntry, ShadowKey, ShadowRecord};
use crate::AuditError;

const PUBLIC_DIR: &str = "public";
const SHADOW_DIR: &str = "shadow";

/// Append-only, dual-channel ledger rooted at one directory.
pub struct AuditLedger {
    root: PathBuf,
    key: ShadowKey,
}

impl AuditLedger {
    pub fn new(root: impl Into<PathBuf>, key: ShadowKey) -> Result<Self, AuditError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(PUBLIC_DIR))?;
        std::fs::create_dir_all(root.join(SHADOW_DIR))?;
        Ok(Self { root, key })
    }

    fn partition(&self, family: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(family)
            .join(format!("{}.log", date.format("%Y-%m-%d")))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), AuditError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        // Durability precedes the operation result
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Append a redacted plaintext record to the public channel.
    pub fn append_public(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let date = event.timestamp.date_naive();
        let line = serde_json::to_string(&redacted_json(event)?)?;
        self.append_line(&self.partition(PUBLIC_DIR, date), &line)?;
        debug!(event = %event.id, stage = ?event.stage, "public audit append");
        Ok(())
    }

    /// Encrypt and append a record to the shadow channel.
    pub fn append_shadow(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let date = event.timestamp.date_naive();
        let record = ShadowRecord::seal(&self.key, event)?;
        let line = serde_json::to_string(&record)?;
        self.append_line(&self.partition(SHADOW_DIR, date), &line)?;
        debug!(event = %event.id, stage = ?event.stage, "shadow audit append");
        Ok(())
    }

    /// Read one public day-partition. Malformed lines are skipped with a
    /// warning; a missing partition reads as empty.
    pub fn read_public(&self, date: NaiveDate) -> Result<Vec<AuditEvent>, AuditError> {
        let path = self.partition(PUBLIC_DIR, date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(%date, error = %e, "skipping malformed public audit line"),
            }
        }
        Ok(events)
    }

    /// Read one shadow day-partition, verifying every entry. A failed
    /// entry becomes `Tampered` and never aborts the rest of the read.
    pub fn read_shadow(&self, date: NaiveDate) -> Result<Vec<ShadowEntry>, AuditError> {
        let path = self.partition(SHADOW_DIR, date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ShadowRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(%date, error = %e, "unparsable shadow record");
                    entries.push(ShadowEntry::Tampered {
                        record: line,
                        reason: format!("unparsable record: {e}"),
                    });
                    continue;
                }
            };
            match record.open(&self.key) {
                Ok(event) => entries.push(ShadowEntry::Intact(event)),
                Err(reason) => {
                    warn!(%date, %reason, "tampered shadow record");
                    entries.push(ShadowEntry::Tampered {
                        record: line,
                        reason,
                    });
                }
            }
        }
        Ok(entries)
    }

    /// Delete whole day-partitions older than the retention horizon in
    /// both families. Returns the removed paths.
    pub fn rotate(&self, retain_days: u32) -> Result<Vec<PathBuf>, AuditError> {
        self.rotate_at(retain_days, chrono::Utc::now().date_naive())
    }

    pub fn rotate_at(&self, retain_days: u32, today: NaiveDate) -> Result<Vec<PathBuf>, AuditError> {
        let horizon = today - chrono::Duration::days(i64::from(retain_days));
        let mut removed = Vec::new();
        for family in [PUBLIC_DIR, SHADOW_DIR] {
            let dir = self.root.join(family);
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                    continue;
                };
                if date < horizon {
                    std::fs::remove_file(&path)?;
                    info!(partition = %path.display(), "retired audit partition");
                    removed.push(path);
                }
            }
        }
        Ok(removed)
    }
}
