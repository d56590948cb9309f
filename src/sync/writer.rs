//! Single writer task for all index mutations.
//!
//! SQLite accepts one writer at a time, so every insert/update/delete issued by
//! the worker pools is funnelled through one task that owns the store handle.
//! Workers await a oneshot reply so per-entry errors still reach the caller.

use super::error::SyncError;
use crate::db::{DatabaseError, EntryCollection, EntryStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A single mutation against the index
#[derive(Debug)]
pub enum WriteOp {
    Insert(EntryCollection),
    UpdateWithContent(EntryCollection),
    UpdateWithoutContent(EntryCollection),
    Delete(String),
}

impl WriteOp {
    fn label(&self) -> &'static str {
        match self {
            WriteOp::Insert(_) => "insert",
            WriteOp::UpdateWithContent(_) => "update+content",
            WriteOp::UpdateWithoutContent(_) => "update",
            WriteOp::Delete(_) => "delete",
        }
    }
}

struct WriteRequest {
    op: WriteOp,
    reply: oneshot::Sender<Result<(), DatabaseError>>,
}

/// Cloneable handle to the writer task.
///
/// The task exits once every handle has been dropped and the queue is empty.
#[derive(Clone)]
pub struct IndexWriter {
    sender: mpsc::Sender<WriteRequest>,
}

impl IndexWriter {
    /// Spawn the writer task; the join handle yields the number of successful writes
    pub fn spawn(store: Arc<dyn EntryStore>, capacity: usize) -> (Self, JoinHandle<u64>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(writer_loop(store, receiver));
        (Self { sender }, handle)
    }

    /// Submit a write and wait for its outcome
    pub async fn write(&self, op: WriteOp) -> Result<(), SyncError> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(WriteRequest { op, reply })
            .await
            .map_err(|_| SyncError::WriterClosed)?;

        outcome.await.map_err(|_| SyncError::WriterClosed)??;
        Ok(())
    }
}

async fn writer_loop(
    store: Arc<dyn EntryStore>,
    mut receiver: mpsc::Receiver<WriteRequest>,
) -> u64 {
    let mut written = 0u64;

    while let Some(WriteRequest { op, reply }) = receiver.recv().await {
        let label = op.label();
        let result = match &op {
            WriteOp::Insert(entry) => store.insert_entry(entry).await,
            WriteOp::UpdateWithContent(entry) => store.update_entry_with_content(entry).await,
            WriteOp::UpdateWithoutContent(entry) => store.update_entry_without_content(entry).await,
            WriteOp::Delete(path) => store.delete_entry(path).await,
        };

        match &result {
            Ok(()) => {
                written += 1;
                tracing::trace!("{} ok", label);
            }
            Err(e) => tracing::debug!("{} failed: {}", label, e),
        }

        // The requesting worker may have been cancelled; nothing to do then
        let _ = reply.send(result);
    }

    tracing::debug!("Index writer finished after {} writes", written);
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_writer_serializes_and_reports() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let (writer, handle) = IndexWriter::spawn(db.clone(), 4);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();
        let entry = super::super::reader::read_entry(
            &path,
            true,
            &super::super::reader::ContentLimits::default(),
        )
        .unwrap();

        writer.write(WriteOp::Insert(entry.clone())).await.unwrap();
        writer
            .write(WriteOp::UpdateWithoutContent(entry.clone()))
            .await
            .unwrap();
        writer.write(WriteOp::Delete(entry.path.clone())).await.unwrap();

        // Store failures come back to the caller that issued the write
        db.close().await;
        let err = writer
            .write(WriteOp::UpdateWithContent(entry))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Database(_)));
        assert!(err.is_fatal());

        drop(writer);
        assert_eq!(handle.await.unwrap(), 3);
    }
}
