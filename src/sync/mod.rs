//! Indexing engine.
//!
//! A run loads the stored inode index, walks the live tree and classifies every
//! entry against it, then fans the resulting work out to fixed-size pools:
//!
//! ```text
//! traversal ──► new-subtree pool ──┐
//!     │    └──► deep-rescan pool ──┼──► sync pool ──► index writer ──► store
//!     └─────────────────────────────┘                      ▲
//! unseen index paths ──► delete pool ──────────────────────┘
//! ```
//!
//! [`FullScan`] rebuilds the index from nothing; [`SyncPipeline`] brings an
//! existing index up to date with the minimal set of writes.

pub mod classify;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod initial;
pub mod model;
pub mod pipeline;
pub mod pool;
pub mod reader;
pub mod synchronizer;
pub mod traversal;
pub mod writer;

pub use classify::{classify, Classification, LiveEntry};
pub use context::StageContext;
pub use error::SyncError;
pub use initial::FullScan;
pub use model::{CollectedInfo, SeenInodes, SyncJob};
pub use pipeline::SyncPipeline;
pub use reader::{read_entry, ContentLimits, FileType, ReadError};
pub use writer::{IndexWriter, WriteOp};
