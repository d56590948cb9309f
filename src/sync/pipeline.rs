//! Maintenance pass: bring the index in line with a tree that was scanned before

use super::context::StageContext;
use super::dispatch::{dispatch_deep_rescan, dispatch_new_subtree};
use super::error::SyncError;
use super::model::SyncJob;
use super::pool::WorkerPool;
use super::synchronizer::{check_deleted, synchronize};
use super::traversal::{traverse, Outlets};
use super::writer::IndexWriter;
use crate::config::IndexConfig;
use crate::db::{EntryStore, InodeIndex, ScanKind, ScanRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Incremental sync of one root against the stored index
pub struct SyncPipeline {
    store: Arc<dyn EntryStore>,
    config: Arc<IndexConfig>,
    cancel: CancellationToken,
}

impl SyncPipeline {
    pub fn new(store: Arc<dyn EntryStore>, config: Arc<IndexConfig>) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie runs to an externally owned token (Ctrl-C handler, parent task)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one maintenance pass over `root`.
    ///
    /// The returned record has already been persisted. A run that was cancelled
    /// or hit a store failure still returns `Ok` with `indexing_completed`
    /// unset; an unreachable root returns [`SyncError::Root`] after its
    /// incomplete summary is written.
    pub async fn run(&self, root: &Path) -> Result<ScanRecord, SyncError> {
        // A fatal error inside this run must not cancel the caller's token
        let cancel = self.cancel.child_token();

        let index = match self.store.load_inode_index().await {
            Ok(index) => index,
            Err(err) => {
                tracing::error!("Cannot load the inode index: {}", err);
                let ctx = StageContext::new(InodeIndex::new(), Arc::clone(&self.config), cancel);
                persist_aborted(self.store.as_ref(), &ctx, ScanKind::Sync).await;
                return Err(err.into());
            }
        };
        tracing::info!("Loaded {} indexed entries", index.len());

        let ctx = StageContext::new(index, Arc::clone(&self.config), cancel.clone());

        let root = match tokio::fs::canonicalize(root).await {
            Ok(root) => root,
            Err(source) => {
                let err = SyncError::Root {
                    path: root.to_path_buf(),
                    source,
                };
                tracing::error!("{}", err);
                ctx.info.record_not_accessed(root, &err);
                persist_outcome(self.store.as_ref(), &ctx, ScanKind::Sync, false).await?;
                return Err(err);
            }
        };
        tracing::info!("Synchronizing {}", root.display());

        let capacity = self.config.queue_capacity;
        let workers = &self.config.workers;
        let (writer, writer_handle) = IndexWriter::spawn(Arc::clone(&self.store), capacity);
        let (new_tx, new_rx) = mpsc::channel::<PathBuf>(capacity);
        let (rescan_tx, rescan_rx) = mpsc::channel::<PathBuf>(capacity);
        let (read_tx, read_rx) = mpsc::channel::<SyncJob>(capacity);
        let (delete_tx, delete_rx) = mpsc::channel::<PathBuf>(capacity);

        let sync_pool = spawn_sync_pool(workers.sync, read_rx, &ctx, &writer);

        let delete_pool = {
            let ctx = ctx.clone();
            let writer = writer.clone();
            let handler = move |path: PathBuf| {
                let ctx = ctx.clone();
                let writer = writer.clone();
                async move { check_deleted(path, &ctx, &writer).await }
            };
            WorkerPool::spawn("delete", workers.deletion, delete_rx, cancel.clone(), handler)
        };

        let subtree_pool = {
            let ctx = ctx.clone();
            let reads = read_tx.clone();
            let handler = move |dir: PathBuf| {
                let ctx = ctx.clone();
                let reads = reads.clone();
                async move {
                    let walk = tokio::task::spawn_blocking(move || {
                        dispatch_new_subtree(&dir, &ctx, &reads)
                    });
                    if let Err(e) = walk.await {
                        tracing::error!("New-subtree walk failed: {}", e);
                    }
                }
            };
            WorkerPool::spawn("new-subtree", workers.new_subtree, new_rx, cancel.clone(), handler)
        };

        let rescan_pool = {
            let ctx = ctx.clone();
            let reads = read_tx.clone();
            let handler = move |dir: PathBuf| {
                let ctx = ctx.clone();
                let reads = reads.clone();
                async move {
                    let listing = tokio::task::spawn_blocking(move || {
                        dispatch_deep_rescan(&dir, &ctx, &reads)
                    });
                    if let Err(e) = listing.await {
                        tracing::error!("Deep rescan failed: {}", e);
                    }
                }
            };
            WorkerPool::spawn(
                "deep-rescan",
                workers.deep_rescan,
                rescan_rx,
                cancel.clone(),
                handler,
            )
        };

        // The traversal owns the original senders and drops them when it returns
        let outlets = Outlets {
            new_subtrees: new_tx,
            deep_rescans: rescan_tx,
            reads: read_tx,
        };
        let traversal = {
            let ctx = ctx.clone();
            let root = root.clone();
            tokio::task::spawn_blocking(move || traverse(&root, &ctx, &outlets))
        };
        let traversal = match traversal.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Join(e)),
        };
        match &traversal {
            Ok(summary) => tracing::info!(
                "Traversal done: {} visited, {} new subtrees, {} deep rescans, {} jobs",
                summary.visited,
                summary.new_subtrees,
                summary.deep_rescans,
                summary.jobs
            ),
            Err(e) => tracing::error!("Traversal of {} failed: {}", root.display(), e),
        }

        subtree_pool.join().await;
        rescan_pool.join().await;

        // Every inode under the root has been classified by now
        if traversal.is_ok() && !cancel.is_cancelled() {
            let mut candidates = 0u64;
            for header in ctx.index.under(&root) {
                if ctx.seen.contains(header.ino()) {
                    continue;
                }
                if delete_tx.send(PathBuf::from(&header.path)).await.is_err() {
                    break;
                }
                candidates += 1;
            }
            tracing::debug!("{} deletion candidates", candidates);
        }
        drop(delete_tx);

        sync_pool.join().await;
        delete_pool.join().await;

        drop(writer);
        let written = writer_handle.await?;
        tracing::debug!("{} writes committed", written);

        let completed = traversal.is_ok() && !cancel.is_cancelled();
        let record = persist_outcome(self.store.as_ref(), &ctx, ScanKind::Sync, completed).await?;
        tracing::info!(
            "Sync of {} finished in {} ms: {} dirs, {} files ({} with content), \
             {} deleted, {} ignored, completed={}",
            root.display(),
            record.scan_duration_ms,
            record.directory_count,
            record.file_count,
            record.file_w_content_count,
            record.deleted_count,
            record.ignored_entries_count,
            record.indexing_completed
        );

        traversal.map(|_| record)
    }
}

/// Pool of entry synchronizers fed by `reads`
pub(crate) fn spawn_sync_pool(
    workers: usize,
    reads: mpsc::Receiver<SyncJob>,
    ctx: &StageContext,
    writer: &IndexWriter,
) -> WorkerPool {
    let ctx = ctx.clone();
    let writer = writer.clone();
    let cancel = ctx.cancel.clone();
    WorkerPool::spawn("sync", workers, reads, cancel, move |job: SyncJob| {
        let ctx = ctx.clone();
        let writer = writer.clone();
        async move { synchronize(job, &ctx, &writer).await }
    })
}

/// Persist the not-accessed batch and the run summary
pub(crate) async fn persist_outcome(
    store: &dyn EntryStore,
    ctx: &StageContext,
    kind: ScanKind,
    completed: bool,
) -> Result<ScanRecord, SyncError> {
    // Counted before the list is drained
    let record = ctx.info.finish(kind, completed);
    let ignored = ctx.info.take_not_accessed();

    if let Err(e) = store.record_ignored(&ignored).await {
        tracing::warn!("Could not store {} ignored entries: {}", ignored.len(), e);
    }
    store.record_scan_summary(&record).await?;
    Ok(record)
}

/// Record an incomplete summary for a run that failed before any stage started
pub(crate) async fn persist_aborted(store: &dyn EntryStore, ctx: &StageContext, kind: ScanKind) {
    if let Err(e) = persist_outcome(store, ctx, kind, false).await {
        tracing::warn!("Could not record the aborted {} run: {}", kind, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn pipeline() -> (Arc<Database>, SyncPipeline) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let pipeline = SyncPipeline::new(db.clone(), Arc::new(IndexConfig::default()));
        (db, pipeline)
    }

    #[tokio::test]
    async fn test_first_run_indexes_everything() {
        let (db, pipeline) = pipeline().await;
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("a")).unwrap();
        std::fs::write(root.join("a").join("b.txt"), "hello").unwrap();

        let record = pipeline.run(&root).await.unwrap();

        assert!(record.indexing_completed);
        assert_eq!(record.directory_count, 2);
        assert_eq!(record.file_count, 1);
        assert_eq!(record.file_w_content_count, 1);
        assert_eq!(db.count_entries().await.unwrap(), 3);
        assert_eq!(db.recent_scans(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_records_incomplete_run() {
        let (db, pipeline) = pipeline().await;

        let err = pipeline.run(Path::new("/no/such/root")).await.unwrap_err();
        assert!(matches!(err, SyncError::Root { .. }));

        let scans = db.recent_scans(5).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert!(!scans[0].indexing_completed);
        assert_eq!(db.ignored_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_incomplete() {
        let (db, pipeline) = pipeline().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        pipeline.cancel_token().cancel();
        let record = pipeline.run(dir.path()).await.unwrap();

        assert!(!record.indexing_completed);
        assert!(!db.recent_scans(1).await.unwrap()[0].indexing_completed);
    }
}
