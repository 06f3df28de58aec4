//! In-process key-value backend.
//!
//! Behaves like a partitioned key-value store rather than a database: index
//! queries evaluate at most `max_page_items` entries per call and apply the tag
//! filter after the scan, conditional writes are checked against a version
//! attribute, and batch deletes process at most `write_capacity` keys per
//! request, handing the rest back as unprocessed.

mod content;
mod engagement;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hive_core::{ContentId, ContentItem, EngagementRecord, ScopeId, UserId};
use tokio::sync::RwLock;

use crate::{StorageError, MAX_BATCH_WRITE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStorageConfig {
    /// Most index entries a single query evaluates, whatever the caller asks for.
    pub max_page_items: usize,
    /// Most keys a single batch delete processes.
    pub write_capacity: usize,
    /// Artificial delay added to every call.
    pub call_latency: Option<Duration>,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_page_items: 100,
            write_capacity: MAX_BATCH_WRITE,
            call_latency: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    content: HashMap<ScopeId, HashMap<ContentId, ContentItem>>,
    /// Keyed by content first so the reverse lookup is a range scan.
    engagement: BTreeMap<(ContentId, UserId), EngagementRecord>,
}

#[derive(Debug, Clone)]
pub struct MemoryStorage {
    max_page_items: usize,
    call_latency: Option<Duration>,
    write_capacity: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    state: Arc<RwLock<State>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new(config: MemoryStorageConfig) -> Self {
        Self {
            max_page_items: config.max_page_items.max(1),
            call_latency: config.call_latency,
            write_capacity: Arc::new(AtomicUsize::new(config.write_capacity)),
            unavailable: Arc::new(AtomicBool::new(false)),
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Makes every subsequent call fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_write_capacity(&self, capacity: usize) {
        self.write_capacity.store(capacity, Ordering::SeqCst);
    }

    pub async fn content_count(&self) -> usize {
        let state = self.state.read().await;
        state.content.values().map(HashMap::len).sum()
    }

    pub async fn engagement_count(&self) -> usize {
        self.state.read().await.engagement.len()
    }

    async fn enter(&self) -> Result<(), StorageError> {
        if let Some(latency) = self.call_latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}
