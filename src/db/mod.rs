//! Database module for SQLite persistence

mod migrations;
mod models;
mod repository;
mod store;

pub use models::{
    EntryCollection, InodeHeader, InodeIndex, NotAccessedPath, ScanKind, ScanRecord, SearchResult,
};
pub use repository::{Database, DatabaseError};
pub use store::EntryStore;
