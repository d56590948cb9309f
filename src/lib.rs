//! Sift - incremental filesystem content index
//!
//! Sift keeps a SQLite index of a directory tree (metadata for every entry,
//! text content for configured file types) and brings it up to date without
//! re-reading what has not changed.
//!
//! # Architecture
//!
//! - **Full scan**: clears the index and inserts every entry under a root
//! - **Sync**: compares the live tree against the stored inode index and issues
//!   only the inserts, updates and deletes needed to catch up
//! - **Search**: substring lookup over names, paths and indexed content
//!
//! # Main Modules
//!
//! - [`sync`] - Traversal, change classification and the worker pipeline
//! - [`db`] - SQLite persistence and the [`db::EntryStore`] seam
//! - [`config`] - JSON configuration with environment overrides
//! - [`logging`] - tracing subscriber setup
//!
//! # Example
//!
//! ```rust,no_run
//! use sift::{Database, IndexConfig, SyncPipeline};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = Arc::new(Database::new(Path::new("/tmp/sift.db")).await?);
//! let pipeline = SyncPipeline::new(db, Arc::new(IndexConfig::default()));
//! let record = pipeline.run(Path::new("/home/me/projects")).await?;
//! println!("{} files synced", record.file_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod logging;
pub mod sync;

pub use config::IndexConfig;
pub use db::{Database, EntryStore};
pub use sync::{FullScan, SyncError, SyncPipeline};
