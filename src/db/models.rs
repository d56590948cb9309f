//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Identity and timestamps of one indexed entry, as last persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InodeHeader {
    pub inode: i64,
    pub path: String,
    pub modification_time: i64,
    pub metadata_change_time: i64,
    pub is_dir: bool,
}

impl InodeHeader {
    /// Inode number as reported by the filesystem
    pub fn ino(&self) -> u64 {
        self.inode as u64
    }
}

/// In-memory view of the `entries` table keyed by inode number.
///
/// Loaded once at the start of a maintenance run and never mutated afterwards,
/// so it can be shared between stages without locking.
#[derive(Debug, Clone, Default)]
pub struct InodeIndex {
    headers: HashMap<u64, InodeHeader>,
}

impl InodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: impl IntoIterator<Item = InodeHeader>) -> Self {
        Self {
            headers: headers.into_iter().map(|h| (h.ino(), h)).collect(),
        }
    }

    pub fn lookup(&self, inode: u64) -> Option<&InodeHeader> {
        self.headers.get(&inode)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InodeHeader> {
        self.headers.values()
    }

    /// Headers whose stored path lies at or below `root`
    pub fn under<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = &'a InodeHeader> + 'a {
        self.iter().filter(move |h| Path::new(&h.path).starts_with(root))
    }
}

/// Full persisted record of one filesystem entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntryCollection {
    pub inode: i64,
    pub path: String,
    pub parent_directory: Option<String>,
    pub name: String,
    pub is_dir: bool,
    pub size: i64,
    pub modification_time: i64,
    pub access_time: i64,
    pub metadata_change_time: i64,
    pub owner_id: i64,
    pub group_id: i64,
    pub extension: Option<String>,
    pub filetype: String,
    pub content_snippet: Option<String>,
    pub full_text: Option<String>,
    pub line_count_total: Option<i64>,
    pub line_count_w_content: Option<i64>,
}

impl EntryCollection {
    /// Whether textual content was extracted for this entry
    pub fn has_content(&self) -> bool {
        self.full_text.is_some()
    }
}

/// A path that could not be read, classified or persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotAccessedPath {
    pub path: String,
    pub error: String,
}

impl NotAccessedPath {
    pub fn new(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: error.into(),
        }
    }
}

/// Kind of run a scan record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    /// Initial scan over an emptied index
    Full,
    /// Incremental maintenance pass
    Sync,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Sync => "sync",
        }
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary row written once at the end of every run
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScanRecord {
    pub scan_kind: String,
    pub scan_start: String,
    pub scan_end: String,
    pub scan_duration_ms: i64,
    pub directory_count: i64,
    pub file_count: i64,
    pub file_w_content_count: i64,
    pub ignored_entries_count: i64,
    pub deleted_count: i64,
    pub indexing_completed: bool,
}

impl ScanRecord {
    pub fn new(kind: ScanKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            scan_kind: kind.as_str().to_string(),
            scan_start: start.to_rfc3339(),
            scan_end: end.to_rfc3339(),
            scan_duration_ms: (end - start).num_milliseconds().max(0),
            directory_count: 0,
            file_count: 0,
            file_w_content_count: 0,
            ignored_entries_count: 0,
            deleted_count: 0,
            indexing_completed: false,
        }
    }

    /// Entries handed to the synchronizer during the run
    pub fn total_entries(&self) -> i64 {
        self.directory_count + self.file_count
    }
}

/// Row returned by a search query
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchResult {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: i64,
    pub modification_time: i64,
    pub access_time: i64,
    pub metadata_change_time: i64,
    pub content_snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(inode: i64, path: &str) -> InodeHeader {
        InodeHeader {
            inode,
            path: path.to_string(),
            modification_time: 1,
            metadata_change_time: 1,
            is_dir: false,
        }
    }

    #[test]
    fn test_inode_index_lookup() {
        let index = InodeIndex::from_headers(vec![header(7, "/a/b.txt"), header(9, "/c")]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(7).map(|h| h.path.as_str()), Some("/a/b.txt"));
        assert!(index.lookup(8).is_none());
    }

    #[test]
    fn test_inode_index_under_root() {
        let index = InodeIndex::from_headers(vec![
            header(1, "/a"),
            header(2, "/a/b.txt"),
            header(3, "/ab/c.txt"),
        ]);
        let mut paths: Vec<_> = index.under(Path::new("/a")).map(|h| h.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/a".to_string(), "/a/b.txt".to_string()]);
    }

    #[test]
    fn test_scan_record_duration() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(1500);
        let record = ScanRecord::new(ScanKind::Sync, start, end);
        assert_eq!(record.scan_duration_ms, 1500);
        assert_eq!(record.scan_kind, "sync");
        assert!(!record.indexing_completed);
    }
}
