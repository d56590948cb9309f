//! Persistence gateway used by the sync pipeline

use super::models::{EntryCollection, InodeIndex, NotAccessedPath, ScanRecord};
use super::repository::{Database, DatabaseError};
use async_trait::async_trait;

/// The writes and bulk reads the indexing pipeline needs from a store.
///
/// [`Database`] is the production implementation; tests wrap it to observe calls.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn load_inode_index(&self) -> Result<InodeIndex, DatabaseError>;
    async fn insert_entry(&self, entry: &EntryCollection) -> Result<(), DatabaseError>;
    async fn update_entry_with_content(&self, entry: &EntryCollection)
        -> Result<(), DatabaseError>;
    async fn update_entry_without_content(
        &self,
        entry: &EntryCollection,
    ) -> Result<(), DatabaseError>;
    async fn delete_entry(&self, path: &str) -> Result<(), DatabaseError>;
    async fn record_ignored(&self, entries: &[NotAccessedPath]) -> Result<(), DatabaseError>;
    async fn record_scan_summary(&self, record: &ScanRecord) -> Result<(), DatabaseError>;
    async fn clear_all(&self) -> Result<(), DatabaseError>;
}

#[async_trait]
impl EntryStore for Database {
    async fn load_inode_index(&self) -> Result<InodeIndex, DatabaseError> {
        Database::load_inode_index(self).await
    }

    async fn insert_entry(&self, entry: &EntryCollection) -> Result<(), DatabaseError> {
        Database::insert_entry(self, entry).await
    }

    async fn update_entry_with_content(
        &self,
        entry: &EntryCollection,
    ) -> Result<(), DatabaseError> {
        Database::update_entry_with_content(self, entry).await
    }

    async fn update_entry_without_content(
        &self,
        entry: &EntryCollection,
    ) -> Result<(), DatabaseError> {
        Database::update_entry_without_content(self, entry).await
    }

    async fn delete_entry(&self, path: &str) -> Result<(), DatabaseError> {
        Database::delete_entry(self, path).await
    }

    async fn record_ignored(&self, entries: &[NotAccessedPath]) -> Result<(), DatabaseError> {
        Database::record_ignored(self, entries).await
    }

    async fn record_scan_summary(&self, record: &ScanRecord) -> Result<(), DatabaseError> {
        Database::record_scan_summary(self, record).await
    }

    async fn clear_all(&self) -> Result<(), DatabaseError> {
        Database::clear_all(self).await
    }
}
