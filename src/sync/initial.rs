//! Initial full scan: rebuild the index from scratch

use super::context::StageContext;
use super::error::SyncError;
use super::model::SyncJob;
use super::pipeline::{persist_aborted, persist_outcome, spawn_sync_pool};
use super::traversal::keep_entry;
use super::writer::IndexWriter;
use crate::config::IndexConfig;
use crate::db::{EntryStore, InodeIndex, ScanKind, ScanRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntryExt, WalkDir};

/// Clears the index and inserts every entry under a root
pub struct FullScan {
    store: Arc<dyn EntryStore>,
    config: Arc<IndexConfig>,
    cancel: CancellationToken,
}

impl FullScan {
    pub fn new(store: Arc<dyn EntryStore>, config: Arc<IndexConfig>) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walk `root` and insert everything that survives exclusion.
    ///
    /// The existing index is only cleared once the root is known to be
    /// reachable, so a typo never wipes a good index.
    pub async fn run(&self, root: &Path) -> Result<ScanRecord, SyncError> {
        let cancel = self.cancel.child_token();
        let ctx = StageContext::new(InodeIndex::new(), Arc::clone(&self.config), cancel.clone());

        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|source| SyncError::Root {
                path: root.to_path_buf(),
                source,
            })?;

        if let Err(err) = self.store.clear_all().await {
            tracing::error!("Cannot clear the index: {}", err);
            persist_aborted(self.store.as_ref(), &ctx, ScanKind::Full).await;
            return Err(err.into());
        }
        tracing::info!("Full scan of {}", root.display());

        let capacity = self.config.queue_capacity;
        let workers = &self.config.workers;
        let (writer, writer_handle) = IndexWriter::spawn(Arc::clone(&self.store), capacity);
        let (dir_tx, dir_rx) = mpsc::channel::<SyncJob>(capacity);
        let (file_tx, file_rx) = mpsc::channel::<SyncJob>(capacity);

        let dir_pool = spawn_sync_pool(workers.new_subtree, dir_rx, &ctx, &writer);
        let file_pool = spawn_sync_pool(workers.sync, file_rx, &ctx, &writer);

        let walk = {
            let ctx = ctx.clone();
            let root = root.clone();
            tokio::task::spawn_blocking(move || walk_all(&root, &ctx, dir_tx, file_tx))
        };
        let emitted = walk.await?;
        tracing::info!("Walk done: {} entries queued", emitted);

        dir_pool.join().await;
        file_pool.join().await;
        drop(writer);
        let written = writer_handle.await?;
        tracing::debug!("{} inserts committed", written);

        let completed = !cancel.is_cancelled();
        let record = persist_outcome(self.store.as_ref(), &ctx, ScanKind::Full, completed).await?;
        tracing::info!(
            "Full scan of {} finished in {} ms: {} dirs, {} files ({} with content), {} ignored",
            root.display(),
            record.scan_duration_ms,
            record.directory_count,
            record.file_count,
            record.file_w_content_count,
            record.ignored_entries_count
        );
        Ok(record)
    }
}

fn walk_all(
    root: &Path,
    ctx: &StageContext,
    dirs: mpsc::Sender<SyncJob>,
    files: mpsc::Sender<SyncJob>,
) -> u64 {
    let mut emitted = 0u64;
    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| keep_entry(e, ctx));

    while let Some(next) = walker.next() {
        if ctx.cancel.is_cancelled() {
            tracing::info!("Full scan of {} cancelled", root.display());
            break;
        }

        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(root));
                tracing::warn!("Skipping {}: {}", path.display(), err);
                ctx.info.record_not_accessed(&path, &err);
                continue;
            }
        };

        let is_dir = entry.file_type().is_dir();
        if !ctx.seen.mark(entry.ino()) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let queue = if is_dir { &dirs } else { &files };
        if queue.blocking_send(SyncJob::insert(entry.into_path())).is_err() {
            tracing::warn!("Reader pools closed, stopping walk of {}", root.display());
            break;
        }
        emitted += 1;
    }

    emitted
}
