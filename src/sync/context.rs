use super::model::{CollectedInfo, SeenInodes};
use super::reader::ContentLimits;
use crate::config::IndexConfig;
use crate::db::InodeIndex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared by every stage of one run
#[derive(Clone)]
pub struct StageContext {
    /// Read-only snapshot of the index taken when the run started
    pub index: Arc<InodeIndex>,
    pub config: Arc<IndexConfig>,
    pub seen: Arc<SeenInodes>,
    pub info: Arc<CollectedInfo>,
    pub cancel: CancellationToken,
}

impl StageContext {
    pub fn new(index: InodeIndex, config: Arc<IndexConfig>, cancel: CancellationToken) -> Self {
        Self {
            index: Arc::new(index),
            config,
            seen: Arc::new(SeenInodes::new()),
            info: Arc::new(CollectedInfo::new()),
            cancel,
        }
    }

    pub fn limits(&self) -> ContentLimits {
        ContentLimits {
            snippet_chars: self.config.snippet_chars,
            max_content_bytes: self.config.max_content_bytes,
        }
    }
}
