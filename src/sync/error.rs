use crate::db::DatabaseError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a scan or sync run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cannot traverse {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index writer has shut down")]
    WriterClosed,

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Whether the error means no further write can succeed
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Database(e) => e.is_fatal(),
            SyncError::Root { .. } => false,
            SyncError::WriterClosed | SyncError::Join(_) => true,
        }
    }
}
