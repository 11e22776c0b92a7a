use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Where a message's internal date came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    /// Parsed from the `Date` header
    Header,
    /// Fallback to the file's modification time
    FileModified,
}

/// A loaded `.eml` file: untouched bytes plus the parsed header block
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub path: PathBuf,
    pub raw_bytes: Vec<u8>,
    /// Lowercased header name -> value, last occurrence wins
    headers: HashMap<String, String>,
    pub internal_date: DateTime<Utc>,
    pub date_source: DateSource,
}

impl ParsedMessage {
    pub fn new(
        path: PathBuf,
        raw_bytes: Vec<u8>,
        headers: HashMap<String, String>,
        internal_date: DateTime<Utc>,
        date_source: DateSource,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            path,
            raw_bytes,
            headers,
            internal_date,
            date_source,
        }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Trimmed `Message-ID` value, compared byte-for-byte
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DuplicateKey(String);

impl DuplicateKey {
    /// Returns `None` for blank values
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gmail search query matching this Message-ID
    ///
    /// `rfc822msgid:` takes the bare id; the key itself keeps its brackets.
    pub fn search_query(&self) -> String {
        let bare = self
            .0
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(&self.0);
        format!("rfc822msgid:{}", bare)
    }
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file that could not be imported and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Per-run counters; `scanned == imported + skipped_duplicate + failed` after every file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub scanned: usize,
    pub imported: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub failures: Vec<FileFailure>,
}

impl ImportStats {
    pub fn record_imported(&mut self) {
        self.scanned += 1;
        self.imported += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.scanned += 1;
        self.skipped_duplicate += 1;
    }

    pub fn record_failure(&mut self, path: PathBuf, error: String) {
        self.scanned += 1;
        self.failed += 1;
        self.failures.push(FileFailure { path, error });
    }

    pub fn is_consistent(&self) -> bool {
        self.scanned == self.imported + self.skipped_duplicate + self.failed
            && self.failed == self.failures.len()
    }
}

/// What happened to a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Imported,
    SkippedDuplicate,
    Failed,
}

/// Emitted after every processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub scanned: usize,
    pub total: usize,
    pub imported: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

impl ProgressEvent {
    pub fn from_stats(stats: &ImportStats, total: usize, path: PathBuf, outcome: FileOutcome) -> Self {
        Self {
            scanned: stats.scanned,
            total,
            imported: stats.imported,
            skipped_duplicate: stats.skipped_duplicate,
            failed: stats.failed,
            path,
            outcome,
        }
    }
}
