#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use hive_core::{
    ContentId, ContentItem, ContentKey, CounterDelta, Direction, EngagementKey, EngagementRecord,
    IndexKey, ReportOutcome, ScopeId, SortKey, TagId, UserId,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStorage, MemoryStorageConfig};
pub use postgres::PostgresStorage;

/// Upper bound on keys in one batch write request.
pub const MAX_BATCH_WRITE: usize = 25;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("content not found")]
    ContentNotFound,
    #[error("engagement record not found")]
    RecordNotFound,
    #[error("content already exists")]
    ContentExists,
    #[error("record version conflict")]
    VersionConflict,
    #[error("content has been reviewed")]
    ContentReviewed,
    #[error("batch of {0} keys exceeds the write limit")]
    BatchTooLarge(usize),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage call timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(String),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
}

impl StorageError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContentNotFound | Self::RecordNotFound)
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout)
    }
}

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// One round-trip against a scope's secondary index.
///
/// `limit` bounds how many index entries the store evaluates. Backends that
/// filter after the index scan may return fewer matching items than that,
/// and every backend may cap a page below `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    pub scope_id: ScopeId,
    pub sort: SortKey,
    pub direction: Direction,
    pub limit: usize,
    pub start_after: Option<IndexKey>,
    pub tags: BTreeSet<TagId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    /// Resume point for the next round-trip; `None` once the index is exhausted.
    pub last_evaluated: Option<IndexKey>,
}

/// One round-trip against the engagement reverse index (by content id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementQuery {
    pub content_id: ContentId,
    pub limit: usize,
    pub start_after: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngagementPage {
    pub records: Vec<EngagementRecord>,
    pub last_evaluated: Option<UserId>,
}

// ---------------------------------------------------------------------------
// Domain-specific storage traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentStorage: Send + Sync {
    async fn ping(&self) -> Result<(), StorageError>;
    /// Inserts a new item. Fails with `ContentExists` if the key is taken.
    async fn put_content(&self, item: &ContentItem) -> Result<(), StorageError>;
    async fn get_content(&self, key: ContentKey) -> Result<ContentItem, StorageError>;
    async fn query_content(&self, query: &ContentQuery) -> Result<ContentPage, StorageError>;
    /// Conditional arithmetic update: every counter becomes `max(0, count + delta)`.
    async fn adjust_counters(
        &self,
        key: ContentKey,
        delta: &CounterDelta,
    ) -> Result<ContentItem, StorageError>;
    /// Moves `last_activity_at` forward to `at`; never moves it backwards.
    async fn touch_activity(&self, key: ContentKey, at: i64) -> Result<(), StorageError>;
    /// Records a moderator review: sets `reviewed` and clears `obfuscated`.
    async fn mark_reviewed(&self, key: ContentKey) -> Result<ContentItem, StorageError>;
    async fn set_pinned(&self, key: ContentKey, pinned: bool)
        -> Result<ContentItem, StorageError>;
    /// Removes the item. Fails with `ContentNotFound` if it is already gone.
    async fn delete_content(&self, key: ContentKey) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EngagementStorage: Send + Sync {
    async fn get_engagement(
        &self,
        user_id: &UserId,
        content_id: ContentId,
    ) -> Result<EngagementRecord, StorageError>;
    /// Records the user has for the given ids; ids without a record are absent
    /// from the map.
    async fn batch_get_engagement(
        &self,
        user_id: &UserId,
        content_ids: &[ContentId],
    ) -> Result<HashMap<ContentId, EngagementRecord>, StorageError>;
    /// Writes `record` if the stored version still equals `record.version`
    /// (0 meaning "not stored yet"). Returns the record with its new version.
    async fn put_engagement(
        &self,
        record: &EngagementRecord,
    ) -> Result<EngagementRecord, StorageError>;
    /// Writes the record and applies the report outcome to the content item
    /// as one atomic unit. Fails with `ContentReviewed` when adding a report
    /// to reviewed content.
    async fn commit_report(
        &self,
        record: &EngagementRecord,
        content: ContentKey,
        outcome: ReportOutcome,
    ) -> Result<(EngagementRecord, ContentItem), StorageError>;
    /// Writes the record and moves the item's counters by `delta` as one
    /// atomic unit; every counter becomes `max(0, count + delta)`.
    async fn commit_vote(
        &self,
        record: &EngagementRecord,
        content: ContentKey,
        delta: &CounterDelta,
    ) -> Result<(EngagementRecord, ContentItem), StorageError>;
    async fn query_engagement(
        &self,
        query: &EngagementQuery,
    ) -> Result<EngagementPage, StorageError>;
    /// Deletes up to [`MAX_BATCH_WRITE`] records. Returns the keys the store
    /// did not get to; missing keys count as deleted.
    async fn batch_delete_engagement(
        &self,
        keys: &[EngagementKey],
    ) -> Result<Vec<EngagementKey>, StorageError>;
}

/// Unified supertrait for code that needs access to all storage domains.
pub trait Storage: ContentStorage + EngagementStorage {}

impl<T> Storage for T where T: ContentStorage + EngagementStorage {}

pub(crate) fn check_batch_size(keys: &[EngagementKey]) -> Result<(), StorageError> {
    if keys.len() > MAX_BATCH_WRITE {
        return Err(StorageError::BatchTooLarge(keys.len()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Migration helpers
// ---------------------------------------------------------------------------

pub async fn migrate() -> Result<(), StorageError> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| StorageError::MissingDatabaseUrl)?;
    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .map_err(|error| StorageError::Database(error.to_string()))?;
    migrate_with_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_with_pool(pool: &sqlx::PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|error| StorageError::Migration(error.to_string()))?;
    Ok(())
}
