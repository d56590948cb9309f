//! Database repository for CRUD operations

use super::migrations::INIT_SCHEMA;
use super::models::{
    EntryCollection, InodeHeader, InodeIndex, NotAccessedPath, ScanRecord, SearchResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Query error: {0}")]
    QueryError(String),
}

impl DatabaseError {
    /// True when the store itself is gone and no further write can succeed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlx(
                sqlx::Error::PoolClosed
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Io(_)
            ) | DatabaseError::Migration(_)
        )
    }
}

const ENTRY_COLUMNS: &str = "inode, path, parent_directory, name, is_dir, size, \
     modification_time, access_time, metadata_change_time, owner_id, group_id, \
     extension, filetype, content_snippet, full_text, line_count_total, line_count_w_content";

/// Database connection and operations
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // A single connection that is never recycled, otherwise the data goes with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(INIT_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        Ok(())
    }

    // ========================================================================
    // Entry operations
    // ========================================================================

    /// Load every indexed entry's identity, keyed by inode
    pub async fn load_inode_index(&self) -> Result<InodeIndex, DatabaseError> {
        let headers = sqlx::query_as::<_, InodeHeader>(
            "SELECT inode, path, modification_time, metadata_change_time, is_dir FROM entries",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(InodeIndex::from_headers(headers))
    }

    /// Insert an entry, replacing any row that already carries its inode
    pub async fn insert_entry(&self, entry: &EntryCollection) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        evict_stale_path(&mut tx, entry).await?;
        upsert_row(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rewrite every column of an indexed entry, content included
    pub async fn update_entry_with_content(
        &self,
        entry: &EntryCollection,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        evict_stale_path(&mut tx, entry).await?;

        let result = sqlx::query(
            r#"
            UPDATE entries
            SET path = ?, parent_directory = ?, name = ?, is_dir = ?, size = ?,
                modification_time = ?, access_time = ?, metadata_change_time = ?,
                owner_id = ?, group_id = ?, extension = ?, filetype = ?,
                content_snippet = ?, full_text = ?, line_count_total = ?, line_count_w_content = ?
            WHERE inode = ?
            "#,
        )
        .bind(&entry.path)
        .bind(&entry.parent_directory)
        .bind(&entry.name)
        .bind(entry.is_dir)
        .bind(entry.size)
        .bind(entry.modification_time)
        .bind(entry.access_time)
        .bind(entry.metadata_change_time)
        .bind(entry.owner_id)
        .bind(entry.group_id)
        .bind(&entry.extension)
        .bind(&entry.filetype)
        .bind(&entry.content_snippet)
        .bind(&entry.full_text)
        .bind(entry.line_count_total)
        .bind(entry.line_count_w_content)
        .bind(entry.inode)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // The row was evicted earlier in this pass by an entry that took over its path
            upsert_row(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rewrite the metadata columns of an indexed entry, keeping its stored content
    pub async fn update_entry_without_content(
        &self,
        entry: &EntryCollection,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        evict_stale_path(&mut tx, entry).await?;

        let result = sqlx::query(
            r#"
            UPDATE entries
            SET path = ?, parent_directory = ?, name = ?, is_dir = ?, size = ?,
                modification_time = ?, access_time = ?, metadata_change_time = ?,
                owner_id = ?, group_id = ?, extension = ?, filetype = ?
            WHERE inode = ?
            "#,
        )
        .bind(&entry.path)
        .bind(&entry.parent_directory)
        .bind(&entry.name)
        .bind(entry.is_dir)
        .bind(entry.size)
        .bind(entry.modification_time)
        .bind(entry.access_time)
        .bind(entry.metadata_change_time)
        .bind(entry.owner_id)
        .bind(entry.group_id)
        .bind(&entry.extension)
        .bind(&entry.filetype)
        .bind(entry.inode)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // The row was evicted earlier in this pass by an entry that took over its path
            upsert_row(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete the entry stored at `path`
    pub async fn delete_entry(&self, path: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM entries WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Check whether an entry is stored at `path`
    pub async fn entry_exists(&self, path: &str) -> Result<bool, DatabaseError> {
        let row: Option<i64> = sqlx::query_scalar("SELECT inode FROM entries WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Get the entry stored at `path`
    pub async fn get_entry(&self, path: &str) -> Result<EntryCollection, DatabaseError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE path = ?");
        sqlx::query_as::<_, EntryCollection>(&sql)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Entry not found: {}", path)))
    }

    /// Number of indexed entries
    pub async fn count_entries(&self) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Remove every entry and ignored path ahead of a fresh full scan
    pub async fn clear_all(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entries").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM ignored_entries")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    // ========================================================================
    // Ignored entries and scan records
    // ========================================================================

    /// Persist a batch of paths that could not be indexed
    pub async fn record_ignored(&self, entries: &[NotAccessedPath]) -> Result<(), DatabaseError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query("INSERT INTO ignored_entries (path, error) VALUES (?, ?)")
                .bind(&entry.path)
                .bind(&entry.error)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// All recorded ignored paths, oldest first
    pub async fn ignored_entries(&self) -> Result<Vec<NotAccessedPath>, DatabaseError> {
        Ok(sqlx::query_as::<_, NotAccessedPath>(
            "SELECT path, error FROM ignored_entries ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Persist the summary of a finished (or aborted) run
    pub async fn record_scan_summary(&self, record: &ScanRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO full_scans
            (scan_kind, scan_start, scan_end, scan_duration_ms, directory_count, file_count,
             file_w_content_count, ignored_entries_count, deleted_count, indexing_completed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.scan_kind)
        .bind(&record.scan_start)
        .bind(&record.scan_end)
        .bind(record.scan_duration_ms)
        .bind(record.directory_count)
        .bind(record.file_count)
        .bind(record.file_w_content_count)
        .bind(record.ignored_entries_count)
        .bind(record.deleted_count)
        .bind(record.indexing_completed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent scan records, newest first
    pub async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanRecord>, DatabaseError> {
        Ok(sqlx::query_as::<_, ScanRecord>(
            r#"
            SELECT scan_kind, scan_start, scan_end, scan_duration_ms, directory_count, file_count,
                   file_w_content_count, ignored_entries_count, deleted_count, indexing_completed
            FROM full_scans ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Case-insensitive substring search over names, paths and indexed text
    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<SearchResult>, DatabaseError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(DatabaseError::QueryError(
                "Search term cannot be empty".to_string(),
            ));
        }

        let pattern = format!("%{}%", escape_like(term));
        Ok(sqlx::query_as::<_, SearchResult>(
            r#"
            SELECT path, name, is_dir, size, modification_time, access_time,
                   metadata_change_time, content_snippet
            FROM entries
            WHERE name LIKE ?1 ESCAPE '\' OR path LIKE ?1 ESCAPE '\' OR full_text LIKE ?1 ESCAPE '\'
            ORDER BY is_dir DESC, path ASC
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Drop a row that occupies `entry.path` under a different inode (the file was replaced)
async fn evict_stale_path(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &EntryCollection,
) -> Result<(), DatabaseError> {
    sqlx::query("DELETE FROM entries WHERE path = ? AND inode <> ?")
        .bind(&entry.path)
        .bind(entry.inode)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Full-row insert keyed by inode; an existing row for the inode is overwritten
async fn upsert_row(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &EntryCollection,
) -> Result<(), DatabaseError> {
    let sql = format!(
        r#"
        INSERT INTO entries ({ENTRY_COLUMNS})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(inode) DO UPDATE SET
            path = excluded.path,
            parent_directory = excluded.parent_directory,
            name = excluded.name,
            is_dir = excluded.is_dir,
            size = excluded.size,
            modification_time = excluded.modification_time,
            access_time = excluded.access_time,
            metadata_change_time = excluded.metadata_change_time,
            owner_id = excluded.owner_id,
            group_id = excluded.group_id,
            extension = excluded.extension,
            filetype = excluded.filetype,
            content_snippet = excluded.content_snippet,
            full_text = excluded.full_text,
            line_count_total = excluded.line_count_total,
            line_count_w_content = excluded.line_count_w_content
        "#
    );

    sqlx::query(&sql)
        .bind(entry.inode)
        .bind(&entry.path)
        .bind(&entry.parent_directory)
        .bind(&entry.name)
        .bind(entry.is_dir)
        .bind(entry.size)
        .bind(entry.modification_time)
        .bind(entry.access_time)
        .bind(entry.metadata_change_time)
        .bind(entry.owner_id)
        .bind(entry.group_id)
        .bind(&entry.extension)
        .bind(&entry.filetype)
        .bind(&entry.content_snippet)
        .bind(&entry.full_text)
        .bind(entry.line_count_total)
        .bind(entry.line_count_w_content)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ScanKind, ScanRecord};
    use chrono::Utc;

    fn entry(inode: i64, path: &str) -> EntryCollection {
        EntryCollection {
            inode,
            path: path.to_string(),
            parent_directory: Some("/tmp".to_string()),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            is_dir: false,
            size: 12,
            modification_time: 100,
            access_time: 100,
            metadata_change_time: 100,
            owner_id: 1000,
            group_id: 1000,
            extension: Some("txt".to_string()),
            filetype: "documentation".to_string(),
            content_snippet: Some("hello world".to_string()),
            full_text: Some("hello world\n".to_string()),
            line_count_total: Some(1),
            line_count_w_content: Some(1),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_index() {
        let db = Database::in_memory().await.unwrap();
        db.insert_entry(&entry(42, "/tmp/a.txt")).await.unwrap();

        let index = db.load_inode_index().await.unwrap();
        assert_eq!(index.len(), 1);
        let header = index.lookup(42).unwrap();
        assert_eq!(header.path, "/tmp/a.txt");
        assert_eq!(header.modification_time, 100);
        assert!(!header.is_dir);
    }

    #[tokio::test]
    async fn test_insert_replaces_stale_path_owner() {
        let db = Database::in_memory().await.unwrap();
        db.insert_entry(&entry(1, "/tmp/a.txt")).await.unwrap();
        // Same path, new inode: the file was replaced on disk
        db.insert_entry(&entry(2, "/tmp/a.txt")).await.unwrap();

        let index = db.load_inode_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.lookup(2).is_some());
    }

    #[tokio::test]
    async fn test_update_without_content_keeps_text() {
        let db = Database::in_memory().await.unwrap();
        db.insert_entry(&entry(5, "/tmp/a.txt")).await.unwrap();

        let mut changed = entry(5, "/tmp/renamed.txt");
        changed.full_text = None;
        changed.content_snippet = None;
        changed.metadata_change_time = 200;
        db.update_entry_without_content(&changed).await.unwrap();

        let stored = db.get_entry("/tmp/renamed.txt").await.unwrap();
        assert_eq!(stored.metadata_change_time, 200);
        assert_eq!(stored.full_text.as_deref(), Some("hello world\n"));
        assert!(!db.entry_exists("/tmp/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_swapped_paths_keep_both_rows() {
        let db = Database::in_memory().await.unwrap();
        db.insert_entry(&entry(1, "/tmp/x.txt")).await.unwrap();
        db.insert_entry(&entry(2, "/tmp/y.txt")).await.unwrap();

        // Inode 1 takes y.txt first, which evicts inode 2's row
        let mut first = entry(1, "/tmp/y.txt");
        first.full_text = None;
        db.update_entry_without_content(&first).await.unwrap();
        let mut second = entry(2, "/tmp/x.txt");
        second.full_text = None;
        db.update_entry_without_content(&second).await.unwrap();

        let index = db.load_inode_index().await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(1).unwrap().path, "/tmp/y.txt");
        assert_eq!(index.lookup(2).unwrap().path, "/tmp/x.txt");
        assert_eq!(
            db.get_entry("/tmp/y.txt").await.unwrap().full_text.as_deref(),
            Some("hello world\n")
        );

        // A content update for a row that is gone lands as a full row too
        db.update_entry_with_content(&entry(9, "/tmp/none.txt"))
            .await
            .unwrap();
        assert!(db.entry_exists("/tmp/none.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let db = Database::in_memory().await.unwrap();
        db.insert_entry(&entry(1, "/tmp/a.txt")).await.unwrap();
        db.insert_entry(&entry(2, "/tmp/b.txt")).await.unwrap();
        db.record_ignored(&[NotAccessedPath::new("/tmp/x", "permission denied")])
            .await
            .unwrap();

        db.delete_entry("/tmp/a.txt").await.unwrap();
        assert_eq!(db.count_entries().await.unwrap(), 1);

        db.clear_all().await.unwrap();
        assert_eq!(db.count_entries().await.unwrap(), 0);
        assert!(db.ignored_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_summary_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let mut record = ScanRecord::new(ScanKind::Full, Utc::now(), Utc::now());
        record.directory_count = 3;
        record.file_count = 7;
        record.indexing_completed = true;
        db.record_scan_summary(&record).await.unwrap();

        let scans = db.recent_scans(5).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].total_entries(), 10);
        assert!(scans[0].indexing_completed);
    }

    #[tokio::test]
    async fn test_search_matches_name_and_text() {
        let db = Database::in_memory().await.unwrap();
        db.insert_entry(&entry(1, "/tmp/notes.txt")).await.unwrap();
        let mut other = entry(2, "/tmp/other.txt");
        other.full_text = Some("nothing relevant".to_string());
        db.insert_entry(&other).await.unwrap();

        assert_eq!(db.search("NOTES", 10).await.unwrap().len(), 1);
        assert_eq!(db.search("hello", 10).await.unwrap().len(), 1);
        assert_eq!(db.search("100%", 10).await.unwrap().len(), 0);
        assert!(db.search("  ", 10).await.is_err());
    }
}
