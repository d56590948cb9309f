//! Work items and run-level aggregates shared by the pipeline stages

use crate::db::{NotAccessedPath, ScanKind, ScanRecord};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// One path that needs reading and persisting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub path: PathBuf,
    /// The inode already has a row in the index
    pub is_indexed: bool,
    /// Content must be re-read, not just metadata
    pub is_content_change: bool,
}

impl SyncJob {
    pub fn insert(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_indexed: false,
            is_content_change: true,
        }
    }

    pub fn content_update(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_indexed: true,
            is_content_change: true,
        }
    }

    pub fn metadata_update(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_indexed: true,
            is_content_change: false,
        }
    }
}

/// Run statistics, updated concurrently by every worker
#[derive(Debug)]
pub struct CollectedInfo {
    started_at: DateTime<Utc>,
    directories: AtomicU64,
    files: AtomicU64,
    files_with_content: AtomicU64,
    deleted: AtomicU64,
    aborted: AtomicBool,
    not_accessed: Mutex<Vec<NotAccessedPath>>,
}

impl Default for CollectedInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectedInfo {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            directories: AtomicU64::new(0),
            files: AtomicU64::new(0),
            files_with_content: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            not_accessed: Mutex::new(Vec::new()),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Count an entry that was written to the index
    pub fn record_synced(&self, is_dir: bool, has_content: bool) {
        if is_dir {
            self.directories.fetch_add(1, Ordering::Relaxed);
        } else {
            self.files.fetch_add(1, Ordering::Relaxed);
            if has_content {
                self.files_with_content.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember a path that could not be processed
    pub fn record_not_accessed(&self, path: &Path, error: impl Display) {
        let entry = NotAccessedPath::new(path.to_string_lossy(), error.to_string());
        let mut list = self.not_accessed.lock().unwrap_or_else(|e| e.into_inner());
        list.push(entry);
    }

    /// Flag the run as incomplete regardless of how the stages end
    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn directories(&self) -> u64 {
        self.directories.load(Ordering::Relaxed)
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn files_with_content(&self) -> u64 {
        self.files_with_content.load(Ordering::Relaxed)
    }

    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    pub fn not_accessed_count(&self) -> usize {
        self.not_accessed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Drain the not-accessed list accumulated so far
    pub fn take_not_accessed(&self) -> Vec<NotAccessedPath> {
        std::mem::take(&mut *self.not_accessed.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Freeze the counters into the summary row for this run
    pub fn finish(&self, kind: ScanKind, completed: bool) -> ScanRecord {
        let mut record = ScanRecord::new(kind, self.started_at, Utc::now());
        record.directory_count = self.directories() as i64;
        record.file_count = self.files() as i64;
        record.file_w_content_count = self.files_with_content() as i64;
        record.ignored_entries_count = self.not_accessed_count() as i64;
        record.deleted_count = self.deleted() as i64;
        record.indexing_completed = completed && !self.is_aborted();
        record
    }
}

/// Inodes already classified during the current pass
#[derive(Debug, Default)]
pub struct SeenInodes {
    inner: Mutex<HashSet<u64>>,
}

impl SeenInodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time an inode is marked
    pub fn mark(&self, inode: u64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(inode)
    }

    pub fn contains(&self, inode: u64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&inode)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
