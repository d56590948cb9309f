//! Dispatchers for directories the root traversal could not settle on its own

use super::classify::{classify, LiveEntry};
use super::context::StageContext;
use super::model::SyncJob;
use super::traversal::{file_job, keep_entry};
use std::path::Path;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Walk a directory that has no row in the index and queue an insert for every entry in it.
///
/// The directory itself was already marked seen by whoever queued it. Returns
/// the number of jobs emitted.
pub fn dispatch_new_subtree(dir: &Path, ctx: &StageContext, reads: &mpsc::Sender<SyncJob>) -> u64 {
    let mut emitted = 0u64;
    let mut walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| keep_entry(e, ctx));

    while let Some(next) = walker.next() {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_path_buf();
                tracing::warn!("Skipping {}: {}", path.display(), err);
                ctx.info.record_not_accessed(&path, &err);
                continue;
            }
        };

        if entry.depth() > 0 {
            let inode = match entry.metadata() {
                Ok(md) => std::os::unix::fs::MetadataExt::ino(&md),
                Err(err) => {
                    tracing::warn!("Cannot stat {}: {}", entry.path().display(), err);
                    ctx.info.record_not_accessed(entry.path(), &err);
                    continue;
                }
            };
            if !ctx.seen.mark(inode) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }
        }

        if reads.blocking_send(SyncJob::insert(entry.into_path())).is_err() {
            tracing::warn!("Read queue closed while walking {}", dir.display());
            break;
        }
        emitted += 1;
    }

    tracing::debug!("New subtree {}: {} jobs", dir.display(), emitted);
    emitted
}

/// Re-enumerate the immediate children of a directory whose metadata changed.
///
/// Only non-directory children are classified here: subdirectories are visited
/// by the root traversal anyway. Returns the number of jobs emitted.
pub fn dispatch_deep_rescan(dir: &Path, ctx: &StageContext, reads: &mpsc::Sender<SyncJob>) -> u64 {
    let children = match std::fs::read_dir(dir) {
        Ok(children) => children,
        Err(err) => {
            tracing::warn!("Cannot list {}: {}", dir.display(), err);
            ctx.info.record_not_accessed(dir, &err);
            return 0;
        }
    };

    let mut emitted = 0u64;
    for child in children {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let child = match child {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!("Cannot read entry in {}: {}", dir.display(), err);
                ctx.info.record_not_accessed(dir, &err);
                continue;
            }
        };

        let path = child.path();
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(md) => md,
            Err(err) => {
                // Gone between listing and stat; the deletion check covers it
                tracing::debug!("Cannot stat {}: {}", path.display(), err);
                continue;
            }
        };
        if metadata.is_dir() {
            continue;
        }

        let live = LiveEntry::from_metadata(&path, &metadata);
        if !ctx.seen.mark(live.inode) {
            continue;
        }

        let indexed = ctx.index.lookup(live.inode);
        if let Some(job) = file_job(classify(&live, indexed), path, indexed) {
            if reads.blocking_send(job).is_err() {
                tracing::warn!("Read queue closed while rescanning {}", dir.display());
                break;
            }
            emitted += 1;
        }
    }

    tracing::debug!("Deep rescan {}: {} jobs", dir.display(), emitted);
    emitted
}
