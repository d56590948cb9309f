//! Root traversal: classify every entry under a root and route it to a stage queue

use super::classify::{classify, Classification, LiveEntry};
use super::context::StageContext;
use super::error::SyncError;
use super::model::SyncJob;
use crate::db::InodeHeader;
use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::{DirEntry, WalkDir};

/// Queues the traversal feeds
pub struct Outlets {
    pub new_subtrees: mpsc::Sender<PathBuf>,
    pub deep_rescans: mpsc::Sender<PathBuf>,
    pub reads: mpsc::Sender<SyncJob>,
}

/// Counts reported when a traversal finishes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TraversalSummary {
    pub visited: u64,
    pub new_subtrees: u64,
    pub deep_rescans: u64,
    pub jobs: u64,
    pub errors: u64,
}

/// Walk predicate shared by every walker: prune excluded directories below the root
pub(crate) fn keep_entry(entry: &DirEntry, ctx: &StageContext) -> bool {
    !(entry.depth() > 0 && entry.file_type().is_dir() && ctx.config.is_excluded(entry.file_name()))
}

/// Whether the stored path of `header` still names the same inode through
/// another link than `live`
fn stored_link_alive(header: &InodeHeader, live: &Path) -> bool {
    let stored = Path::new(&header.path);
    stored != live
        && std::fs::symlink_metadata(stored).is_ok_and(|md| md.ino() == header.ino())
}

/// The job a non-directory classification turns into, if any.
///
/// An unchanged entry still needs a metadata write when it was found under a
/// different path than the one stored (rename or move). A hard link reached
/// before the stored one keeps the stored path, so the row does not flip
/// between links from one pass to the next.
pub(crate) fn file_job(
    class: Classification,
    path: PathBuf,
    indexed: Option<&InodeHeader>,
) -> Option<SyncJob> {
    let path = match indexed {
        Some(header) if stored_link_alive(header, &path) => PathBuf::from(&header.path),
        _ => path,
    };

    match class {
        Classification::UnindexedFile => Some(SyncJob::insert(path)),
        Classification::ContentChanged => Some(SyncJob::content_update(path)),
        Classification::Unchanged => indexed
            .filter(|h| Path::new(&h.path) != path)
            .map(|_| SyncJob::metadata_update(path)),
        Classification::UnindexedDir | Classification::MetadataChanged => None,
    }
}

/// Walk `root` depth-first and emit work for everything that differs from the index.
///
/// Runs on a blocking thread. Per-entry failures are recorded and skipped; only
/// an unreachable root is returned as an error.
pub fn traverse(
    root: &Path,
    ctx: &StageContext,
    out: &Outlets,
) -> Result<TraversalSummary, SyncError> {
    std::fs::symlink_metadata(root).map_err(|source| SyncError::Root {
        path: root.to_path_buf(),
        source,
    })?;

    let mut summary = TraversalSummary::default();
    // Directories handed to the deep-rescan stage; their files are not ours to classify
    let mut rescanned: HashSet<PathBuf> = HashSet::new();

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| keep_entry(e, ctx));

    while let Some(next) = walker.next() {
        if ctx.cancel.is_cancelled() {
            tracing::info!("Traversal of {} cancelled", root.display());
            break;
        }

        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                tracing::warn!("Skipping {}: {}", path.display(), err);
                ctx.info.record_not_accessed(&path, &err);
                summary.errors += 1;
                continue;
            }
        };
        summary.visited += 1;

        let is_dir = entry.file_type().is_dir();
        if !is_dir && entry.path().parent().is_some_and(|p| rescanned.contains(p)) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(md) => md,
            Err(err) => {
                tracing::warn!("Cannot stat {}: {}", entry.path().display(), err);
                ctx.info.record_not_accessed(entry.path(), &err);
                summary.errors += 1;
                continue;
            }
        };

        let live = LiveEntry::from_metadata(entry.path(), &metadata);
        if !ctx.seen.mark(live.inode) {
            // Hard link to an inode already handled this pass
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let indexed = ctx.index.lookup(live.inode);
        let class = classify(&live, indexed);
        let path = live.path;
        let delivered = match class {
            Classification::UnindexedDir => {
                walker.skip_current_dir();
                summary.new_subtrees += 1;
                out.new_subtrees.blocking_send(path).is_ok()
            }
            Classification::MetadataChanged => {
                rescanned.insert(path.clone());
                summary.deep_rescans += 1;
                summary.jobs += 1;
                out.reads
                    .blocking_send(SyncJob::metadata_update(path.clone()))
                    .is_ok()
                    && out.deep_rescans.blocking_send(path).is_ok()
            }
            class => match file_job(class, path, indexed) {
                Some(job) => {
                    summary.jobs += 1;
                    out.reads.blocking_send(job).is_ok()
                }
                None => true,
            },
        };

        if !delivered {
            tracing::warn!("Downstream stages closed, stopping traversal of {}", root.display());
            break;
        }
    }

    tracing::debug!("Traversal of {} finished: {:?}", root.display(), summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::db::{InodeHeader, InodeIndex};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Received {
        new_subtrees: Vec<PathBuf>,
        deep_rescans: Vec<PathBuf>,
        reads: Vec<SyncJob>,
    }

    fn run(root: &Path, index: InodeIndex) -> (TraversalSummary, Received) {
        let ctx = StageContext::new(
            index,
            Arc::new(IndexConfig::default()),
            CancellationToken::new(),
        );
        let (new_tx, mut new_rx) = mpsc::channel(64);
        let (rescan_tx, mut rescan_rx) = mpsc::channel(64);
        let (read_tx, mut read_rx) = mpsc::channel(64);
        let out = Outlets {
            new_subtrees: new_tx,
            deep_rescans: rescan_tx,
            reads: read_tx,
        };

        let summary = traverse(root, &ctx, &out).unwrap();
        drop(out);

        let mut received = Received {
            new_subtrees: Vec::new(),
            deep_rescans: Vec::new(),
            reads: Vec::new(),
        };
        while let Ok(p) = new_rx.try_recv() {
            received.new_subtrees.push(p);
        }
        while let Ok(p) = rescan_rx.try_recv() {
            received.deep_rescans.push(p);
        }
        while let Ok(j) = read_rx.try_recv() {
            received.reads.push(j);
        }
        (summary, received)
    }

    fn header_for(path: &Path) -> InodeHeader {
        let md = std::fs::symlink_metadata(path).unwrap();
        let live = LiveEntry::from_metadata(path, &md);
        InodeHeader {
            inode: md.ino() as i64,
            path: path.to_string_lossy().to_string(),
            modification_time: live.modification_time,
            metadata_change_time: live.metadata_change_time,
            is_dir: md.is_dir(),
        }
    }

    #[test]
    fn test_unindexed_root_goes_to_new_subtree() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();

        let (summary, received) = run(dir.path(), InodeIndex::new());
        assert_eq!(received.new_subtrees, vec![dir.path().to_path_buf()]);
        // The subtree belongs to the dispatcher; nothing below the root was visited
        assert_eq!(summary.visited, 1);
        assert!(received.reads.is_empty());
    }

    #[test]
    fn test_unchanged_tree_emits_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("b.txt");
        std::fs::write(&file, "b").unwrap();
        let index = InodeIndex::from_headers(vec![header_for(dir.path()), header_for(&file)]);

        let (summary, received) = run(dir.path(), index);
        assert_eq!(summary.visited, 2);
        assert_eq!(summary.jobs, 0);
        assert!(received.reads.is_empty());
        assert!(received.deep_rescans.is_empty());
    }

    #[test]
    fn test_changed_file_and_directory_routing() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let file = sub.join("b.txt");
        std::fs::write(&file, "b").unwrap();

        let mut stale_file = header_for(&file);
        stale_file.modification_time -= 1;
        let mut stale_sub = header_for(&sub);
        stale_sub.metadata_change_time -= 1;
        let index = InodeIndex::from_headers(vec![header_for(dir.path()), stale_sub, stale_file]);

        let (_, received) = run(dir.path(), index);
        // b.txt sits in a directory handed to deep rescan, so the walk leaves it alone
        assert_eq!(received.deep_rescans, vec![sub.clone()]);
        assert_eq!(received.reads, vec![SyncJob::metadata_update(sub)]);
    }

    #[test]
    fn test_content_change_in_unchanged_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("b.txt");
        std::fs::write(&file, "b").unwrap();
        let mut stale = header_for(&file);
        stale.modification_time += 5;
        let index = InodeIndex::from_headers(vec![header_for(dir.path()), stale]);

        let (_, received) = run(dir.path(), index);
        assert_eq!(received.reads, vec![SyncJob::content_update(file)]);
    }

    #[test]
    fn test_renamed_file_gets_path_refresh() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("new-name.txt");
        std::fs::write(&file, "b").unwrap();
        let mut moved = header_for(&file);
        moved.path = dir.path().join("old-name.txt").to_string_lossy().to_string();
        let index = InodeIndex::from_headers(vec![header_for(dir.path()), moved]);

        let (_, received) = run(dir.path(), index);
        assert_eq!(received.reads, vec![SyncJob::metadata_update(file)]);
    }

    #[test]
    fn test_hard_link_keeps_stored_path() {
        let dir = TempDir::new().unwrap();
        let stored = dir.path().join("stored.txt");
        let other = dir.path().join("other.txt");
        std::fs::write(&stored, "b").unwrap();
        std::fs::hard_link(&stored, &other).unwrap();

        let header = header_for(&stored);
        assert_eq!(file_job(Classification::Unchanged, other.clone(), Some(&header)), None);

        let mut stale = header_for(&stored);
        stale.modification_time -= 1;
        assert_eq!(
            file_job(Classification::ContentChanged, other.clone(), Some(&stale)),
            Some(SyncJob::content_update(stored.clone()))
        );

        // Once the stored link is gone the surviving one takes over
        std::fs::remove_file(&stored).unwrap();
        assert_eq!(
            file_job(Classification::Unchanged, other.clone(), Some(&header)),
            Some(SyncJob::metadata_update(other))
        );
    }

    #[test]
    fn test_excluded_directories_are_pruned() {
        let dir = TempDir::new().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir(&git).unwrap();
        std::fs::write(git.join("HEAD"), "ref").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let index = InodeIndex::from_headers(vec![header_for(dir.path())]);

        let (summary, received) = run(dir.path(), index);
        assert_eq!(summary.visited, 2);
        assert_eq!(received.reads, vec![SyncJob::insert(dir.path().join("a.txt"))]);
        assert!(received.new_subtrees.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let ctx = StageContext::new(
            InodeIndex::new(),
            Arc::new(IndexConfig::default()),
            CancellationToken::new(),
        );
        let (new_tx, _new_rx) = mpsc::channel(1);
        let (rescan_tx, _rescan_rx) = mpsc::channel(1);
        let (read_tx, _read_rx) = mpsc::channel(1);
        let out = Outlets {
            new_subtrees: new_tx,
            deep_rescans: rescan_tx,
            reads: read_tx,
        };

        let err = traverse(Path::new("/no/such/root"), &ctx, &out).unwrap_err();
        assert!(matches!(err, SyncError::Root { .. }));
    }
}
