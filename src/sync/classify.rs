//! Change classification: compares a live stat against the indexed snapshot

use crate::db::InodeHeader;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Nanoseconds since the epoch from a split seconds/nanoseconds stat field
pub fn stat_nanos(secs: i64, nsecs: i64) -> i64 {
    secs.saturating_mul(NANOS_PER_SEC).saturating_add(nsecs)
}

/// The fields of a live stat the classifier looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEntry {
    pub path: PathBuf,
    pub inode: u64,
    pub is_dir: bool,
    pub modification_time: i64,
    pub metadata_change_time: i64,
}

impl LiveEntry {
    /// Build from `lstat` data; symlinks are described, never followed
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            inode: metadata.ino(),
            is_dir: metadata.is_dir(),
            modification_time: stat_nanos(metadata.mtime(), metadata.mtime_nsec()),
            metadata_change_time: stat_nanos(metadata.ctime(), metadata.ctime_nsec()),
        }
    }
}

/// What has to happen to one entry to bring the index up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Directory absent from the index; its whole subtree is new
    UnindexedDir,
    /// File (or other non-directory) absent from the index
    UnindexedFile,
    /// Indexed and identical to the stored snapshot
    Unchanged,
    /// Indexed directory whose mtime or ctime moved: children may have come or gone
    MetadataChanged,
    /// Indexed non-directory whose modification time moved
    ContentChanged,
}

/// Classify a live entry against its (optional) indexed header.
///
/// For files the modification time is the only signal. A directory's mtime
/// only reflects direct child add/remove, so directories compare both times and
/// are never reported as `ContentChanged`.
pub fn classify(live: &LiveEntry, indexed: Option<&InodeHeader>) -> Classification {
    let Some(header) = indexed else {
        return if live.is_dir {
            Classification::UnindexedDir
        } else {
            Classification::UnindexedFile
        };
    };

    if live.is_dir {
        if header.metadata_change_time == live.metadata_change_time
            && header.modification_time == live.modification_time
        {
            Classification::Unchanged
        } else {
            Classification::MetadataChanged
        }
    } else if header.modification_time == live.modification_time {
        Classification::Unchanged
    } else {
        Classification::ContentChanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(is_dir: bool, mtime: i64, ctime: i64) -> LiveEntry {
        LiveEntry {
            path: PathBuf::from("/a/b"),
            inode: 11,
            is_dir,
            modification_time: mtime,
            metadata_change_time: ctime,
        }
    }

    fn header(is_dir: bool, mtime: i64, ctime: i64) -> InodeHeader {
        InodeHeader {
            inode: 11,
            path: "/a/b".to_string(),
            modification_time: mtime,
            metadata_change_time: ctime,
            is_dir,
        }
    }

    #[test]
    fn test_unindexed_entries() {
        assert_eq!(classify(&live(true, 1, 1), None), Classification::UnindexedDir);
        assert_eq!(classify(&live(false, 1, 1), None), Classification::UnindexedFile);
    }

    #[test]
    fn test_file_mtime_is_the_only_signal() {
        let stored = header(false, 10, 10);
        assert_eq!(classify(&live(false, 10, 10), Some(&stored)), Classification::Unchanged);
        // chmod moves ctime only
        assert_eq!(classify(&live(false, 10, 99), Some(&stored)), Classification::Unchanged);
        assert_eq!(
            classify(&live(false, 11, 11), Some(&stored)),
            Classification::ContentChanged
        );
    }

    #[test]
    fn test_directory_never_content_changed() {
        let stored = header(true, 10, 10);
        for (mtime, ctime) in [(10, 10), (11, 10), (10, 11), (12, 13), (0, 0)] {
            let result = classify(&live(true, mtime, ctime), Some(&stored));
            assert_ne!(result, Classification::ContentChanged);
        }
    }

    #[test]
    fn test_directory_metadata_change() {
        let stored = header(true, 10, 10);
        assert_eq!(classify(&live(true, 10, 10), Some(&stored)), Classification::Unchanged);
        assert_eq!(
            classify(&live(true, 10, 12), Some(&stored)),
            Classification::MetadataChanged
        );
        assert_eq!(
            classify(&live(true, 12, 12), Some(&stored)),
            Classification::MetadataChanged
        );
    }

    #[test]
    fn test_stat_nanos() {
        assert_eq!(stat_nanos(2, 5), 2_000_000_005);
        assert_eq!(stat_nanos(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn test_from_metadata_reads_lstat() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("x.txt");
        std::fs::write(&file, "x").unwrap();
        let md = std::fs::symlink_metadata(&file).unwrap();

        let entry = LiveEntry::from_metadata(&file, &md);
        assert!(!entry.is_dir);
        assert_eq!(entry.inode, md.ino());
        assert!(entry.modification_time > 0);
    }
}
