//! Consumers at the end of the pipeline: entry synchronization and deletion checks

use super::context::StageContext;
use super::error::SyncError;
use super::model::SyncJob;
use super::reader::read_entry;
use super::writer::{IndexWriter, WriteOp};
use std::path::{Path, PathBuf};

/// Read one job's entry and issue the single write it calls for.
///
/// | indexed | content change | write                  |
/// |---------|----------------|------------------------|
/// | no      | any            | insert                 |
/// | yes     | no             | update without content |
/// | yes     | yes            | update with content    |
pub async fn synchronize(job: SyncJob, ctx: &StageContext, writer: &IndexWriter) {
    let content_eligible = job.is_content_change && ctx.config.is_content_eligible(&job.path);
    let limits = ctx.limits();
    let path = job.path.clone();

    let read =
        tokio::task::spawn_blocking(move || read_entry(&path, content_eligible, &limits)).await;
    let entry = match read {
        Ok(Ok(entry)) => entry,
        Ok(Err(err)) => {
            tracing::warn!("{}", err);
            ctx.info.record_not_accessed(&job.path, &err);
            return;
        }
        Err(err) => {
            tracing::error!("Reader for {} failed: {}", job.path.display(), err);
            ctx.info.record_not_accessed(&job.path, &err);
            return;
        }
    };

    let (is_dir, has_content) = (entry.is_dir, entry.has_content());
    let op = match (job.is_indexed, job.is_content_change) {
        (false, _) => WriteOp::Insert(entry),
        (true, true) => WriteOp::UpdateWithContent(entry),
        (true, false) => WriteOp::UpdateWithoutContent(entry),
    };

    match writer.write(op).await {
        Ok(()) => {
            tracing::debug!("Synced {}", job.path.display());
            ctx.info.record_synced(is_dir, has_content);
        }
        Err(err) => handle_write_error(&job.path, err, ctx),
    }
}

/// Delete `path` from the index when it no longer exists on disk
pub async fn check_deleted(path: PathBuf, ctx: &StageContext, writer: &IndexWriter) {
    match tokio::fs::symlink_metadata(&path).await {
        Ok(_) => {
            tracing::trace!("{} still present", path.display());
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let key = path.to_string_lossy().to_string();
            match writer.write(WriteOp::Delete(key)).await {
                Ok(()) => {
                    tracing::debug!("Removed {} from the index", path.display());
                    ctx.info.record_deleted();
                }
                Err(err) => handle_write_error(&path, err, ctx),
            }
        }
        Err(err) => {
            tracing::warn!("Cannot check {}: {}", path.display(), err);
            ctx.info.record_not_accessed(&path, &err);
        }
    }
}

/// Per-entry failures are recorded; a dead store stops the whole run
fn handle_write_error(path: &Path, err: SyncError, ctx: &StageContext) {
    if err.is_fatal() {
        tracing::error!("Index store unavailable while writing {}: {}", path.display(), err);
        ctx.info.record_not_accessed(path, &err);
        ctx.info.mark_aborted();
        ctx.cancel.cancel();
    } else {
        tracing::warn!("Failed to persist {}: {}", path.display(), err);
        ctx.info.record_not_accessed(path, &err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::db::{Database, InodeIndex};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    async fn setup() -> (Arc<Database>, StageContext) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let ctx = StageContext::new(
            InodeIndex::new(),
            Arc::new(IndexConfig::default()),
            CancellationToken::new(),
        );
        (db, ctx)
    }

    #[tokio::test]
    async fn test_insert_then_metadata_update_keeps_content() {
        let (db, ctx) = setup().await;
        let (writer, _handle) = IndexWriter::spawn(db.clone(), 8);
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("b.txt");
        std::fs::write(&file, "one\ntwo\n").unwrap();

        synchronize(SyncJob::insert(&file), &ctx, &writer).await;
        synchronize(SyncJob::metadata_update(&file), &ctx, &writer).await;

        let stored = db.get_entry(&file.to_string_lossy()).await.unwrap();
        assert_eq!(stored.full_text.as_deref(), Some("one\ntwo\n"));
        assert_eq!(stored.line_count_total, Some(2));
        assert_eq!(ctx.info.files(), 2);
        assert_eq!(ctx.info.files_with_content(), 1);
    }

    #[tokio::test]
    async fn test_vanished_file_is_recorded_not_fatal() {
        let (db, ctx) = setup().await;
        let (writer, _handle) = IndexWriter::spawn(db.clone(), 8);

        synchronize(SyncJob::insert("/no/such/file.txt"), &ctx, &writer).await;

        assert_eq!(ctx.info.not_accessed_count(), 1);
        assert!(!ctx.cancel.is_cancelled());
        assert_eq!(db.count_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_deleted_removes_missing_path() {
        let (db, ctx) = setup().await;
        let (writer, _handle) = IndexWriter::spawn(db.clone(), 8);
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gone.txt");
        std::fs::write(&file, "x").unwrap();
        synchronize(SyncJob::insert(&file), &ctx, &writer).await;
        std::fs::remove_file(&file).unwrap();

        check_deleted(file.clone(), &ctx, &writer).await;
        // Present paths are left alone
        check_deleted(dir.path().to_path_buf(), &ctx, &writer).await;

        assert_eq!(ctx.info.deleted(), 1);
        assert_eq!(ctx.info.not_accessed_count(), 0);
        assert!(!db.entry_exists(&file.to_string_lossy()).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_store_cancels_run() {
        let (db, ctx) = setup().await;
        let (writer, _handle) = IndexWriter::spawn(db.clone(), 8);
        db.close().await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        synchronize(SyncJob::insert(&file), &ctx, &writer).await;

        assert!(ctx.cancel.is_cancelled());
        assert!(ctx.info.is_aborted());
    }
}
