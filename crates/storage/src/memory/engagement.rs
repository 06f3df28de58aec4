use std::collections::HashMap;
use std::ops::Bound;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use hive_core::{
    ContentId, ContentItem, ContentKey, CounterDelta, EngagementKey, EngagementRecord,
    ReportOutcome, UserId,
};

use super::{MemoryStorage, State};
use crate::{check_batch_size, EngagementPage, EngagementQuery, EngagementStorage, StorageError};

impl State {
    /// Conditional write keyed on the record's version attribute.
    fn write_record(&mut self, record: &EngagementRecord) -> Result<EngagementRecord, StorageError> {
        let key = (record.content_id, record.user_id.clone());
        let current = self.engagement.get(&key).map_or(0, |stored| stored.version);
        if current != record.version {
            return Err(StorageError::VersionConflict);
        }
        let mut stored = record.clone();
        stored.version = current + 1;
        self.engagement.insert(key, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl EngagementStorage for MemoryStorage {
    async fn get_engagement(
        &self,
        user_id: &UserId,
        content_id: ContentId,
    ) -> Result<EngagementRecord, StorageError> {
        self.enter().await?;
        let state = self.state.read().await;
        state
            .engagement
            .get(&(content_id, user_id.clone()))
            .cloned()
            .ok_or(StorageError::RecordNotFound)
    }

    async fn batch_get_engagement(
        &self,
        user_id: &UserId,
        content_ids: &[ContentId],
    ) -> Result<HashMap<ContentId, EngagementRecord>, StorageError> {
        self.enter().await?;
        let state = self.state.read().await;
        Ok(content_ids
            .iter()
            .filter_map(|id| {
                state
                    .engagement
                    .get(&(*id, user_id.clone()))
                    .map(|record| (*id, record.clone()))
            })
            .collect())
    }

    async fn put_engagement(
        &self,
        record: &EngagementRecord,
    ) -> Result<EngagementRecord, StorageError> {
        self.enter().await?;
        self.state.write().await.write_record(record)
    }

    async fn commit_report(
        &self,
        record: &EngagementRecord,
        content: ContentKey,
        outcome: ReportOutcome,
    ) -> Result<(EngagementRecord, ContentItem), StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;

        let mut item = state
            .content
            .get(&content.scope_id)
            .and_then(|scope| scope.get(&content.content_id))
            .cloned()
            .ok_or(StorageError::ContentNotFound)?;
        if outcome == ReportOutcome::Added && item.reviewed {
            return Err(StorageError::ContentReviewed);
        }

        let stored = state.write_record(record)?;
        outcome.apply_to(&mut item);
        if let Some(scope) = state.content.get_mut(&content.scope_id) {
            scope.insert(content.content_id, item.clone());
        }
        Ok((stored, item))
    }

    async fn commit_vote(
        &self,
        record: &EngagementRecord,
        content: ContentKey,
        delta: &CounterDelta,
    ) -> Result<(EngagementRecord, ContentItem), StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;

        // Both writes happen under one guard, after the item is known to exist.
        state.item_mut(content)?;
        let stored = state.write_record(record)?;
        let item = state.item_mut(content)?;
        delta.apply_to(item);
        Ok((stored, item.clone()))
    }

    async fn query_engagement(
        &self,
        query: &EngagementQuery,
    ) -> Result<EngagementPage, StorageError> {
        self.enter().await?;
        let limit = query.limit.min(self.max_page_items);
        if limit == 0 {
            return Err(StorageError::InvalidInput("query limit must be positive".to_owned()));
        }
        let state = self.state.read().await;

        let lower = match &query.start_after {
            Some(user) => Bound::Excluded((query.content_id, user.clone())),
            None => Bound::Included((query.content_id, UserId::new(String::new()))),
        };
        let mut range = state
            .engagement
            .range((lower, Bound::Unbounded))
            .take_while(|((content_id, _), _)| *content_id == query.content_id);

        let records: Vec<EngagementRecord> =
            range.by_ref().take(limit).map(|(_, r)| r.clone()).collect();
        let last_evaluated = if range.next().is_some() {
            records.last().map(|r| r.user_id.clone())
        } else {
            None
        };

        Ok(EngagementPage {
            records,
            last_evaluated,
        })
    }

    async fn batch_delete_engagement(
        &self,
        keys: &[EngagementKey],
    ) -> Result<Vec<EngagementKey>, StorageError> {
        self.enter().await?;
        check_batch_size(keys)?;
        let capacity = self.write_capacity.load(Ordering::SeqCst).min(keys.len());

        let mut state = self.state.write().await;
        for key in &keys[..capacity] {
            state
                .engagement
                .remove(&(key.content_id, key.user_id.clone()));
        }
        Ok(keys[capacity..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use hive_core::{ScopeId, Transition, VoteAction};

    use super::*;
    use crate::{ContentStorage, MemoryStorageConfig, MAX_BATCH_WRITE};

    fn neutral(user: &str, content: ContentKey) -> EngagementRecord {
        EngagementRecord::neutral(UserId::new(user), content, content.scope_id)
    }

    async fn seed_post(storage: &MemoryStorage) -> ContentItem {
        let scope = ScopeId::new();
        let item = ContentItem::new_post(scope, UserId::new("author"), "body".to_owned(), 1);
        storage.put_content(&item).await.expect("put content");
        item
    }

    #[tokio::test]
    async fn conditional_writes_detect_conflicts() {
        let storage = MemoryStorage::default();
        let post = seed_post(&storage).await;
        let record = neutral("user-1", post.key());

        let stored = storage.put_engagement(&record).await.expect("create");
        assert_eq!(stored.version, 1);
        let conflict = storage
            .put_engagement(&record)
            .await
            .expect_err("stale create");
        assert_eq!(conflict, StorageError::VersionConflict);

        let mut voted = stored.clone();
        voted.apply_vote(VoteAction::Up, true, 5);
        let stored = storage.put_engagement(&voted).await.expect("update");
        assert_eq!(stored.version, 2);
        assert!(storage
            .get_engagement(&UserId::new("user-1"), post.content_id)
            .await
            .expect("get")
            .up_voted);
    }

    #[tokio::test]
    async fn commit_vote_moves_record_and_counters_together() {
        let storage = MemoryStorage::default();
        let post = seed_post(&storage).await;
        let mut record = neutral("user-1", post.key());
        let Transition::Apply(delta) = record.apply_vote(VoteAction::Up, true, 5) else {
            panic!("first upvote applies");
        };

        let (stored, item) = storage
            .commit_vote(&record, post.key(), &CounterDelta::from(delta))
            .await
            .expect("commit vote");
        assert!(stored.up_voted);
        assert_eq!(item.up_vote_count, 1);

        // A stale record loses the race and leaves the counters alone.
        assert_eq!(
            storage
                .commit_vote(&record, post.key(), &CounterDelta::from(delta))
                .await,
            Err(StorageError::VersionConflict)
        );
        let item = storage.get_content(post.key()).await.expect("get");
        assert_eq!(item.up_vote_count, 1);
    }

    #[tokio::test]
    async fn commit_vote_on_a_missing_item_writes_nothing() {
        let storage = MemoryStorage::default();
        let post = seed_post(&storage).await;
        storage.delete_content(post.key()).await.expect("delete");

        let mut record = neutral("user-1", post.key());
        let Transition::Apply(delta) = record.apply_vote(VoteAction::Down, true, 5) else {
            panic!("first downvote applies");
        };
        assert_eq!(
            storage
                .commit_vote(&record, post.key(), &CounterDelta::from(delta))
                .await,
            Err(StorageError::ContentNotFound)
        );
        assert_eq!(storage.engagement_count().await, 0);
    }

    #[tokio::test]
    async fn reverse_index_pages_by_user() {
        let storage = MemoryStorage::new(MemoryStorageConfig {
            max_page_items: 2,
            ..MemoryStorageConfig::default()
        });
        let post = seed_post(&storage).await;
        let other = seed_post(&storage).await;
        for user in ["a", "b", "c"] {
            storage
                .put_engagement(&neutral(user, post.key()))
                .await
                .expect("put");
        }
        storage
            .put_engagement(&neutral("a", other.key()))
            .await
            .expect("put other");

        let mut query = EngagementQuery {
            content_id: post.content_id,
            limit: 25,
            start_after: None,
        };
        let first = storage.query_engagement(&query).await.expect("page 1");
        assert_eq!(first.records.len(), 2);
        query.start_after = first.last_evaluated;
        let second = storage.query_engagement(&query).await.expect("page 2");
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].user_id, UserId::new("c"));
        assert!(second.last_evaluated.is_none());
    }

    #[tokio::test]
    async fn batch_delete_returns_unprocessed_beyond_capacity() {
        let storage = MemoryStorage::default();
        storage.set_write_capacity(2);
        let post = seed_post(&storage).await;
        let mut keys = Vec::new();
        for user in ["a", "b", "c"] {
            let record = neutral(user, post.key());
            keys.push(record.key());
            storage.put_engagement(&record).await.expect("put");
        }

        let unprocessed = storage
            .batch_delete_engagement(&keys)
            .await
            .expect("batch delete");
        assert_eq!(unprocessed, keys[2..].to_vec());
        assert_eq!(storage.engagement_count().await, 1);

        let too_many: Vec<EngagementKey> = (0..=MAX_BATCH_WRITE).map(|_| keys[0].clone()).collect();
        assert_eq!(
            storage.batch_delete_engagement(&too_many).await,
            Err(StorageError::BatchTooLarge(MAX_BATCH_WRITE + 1))
        );
    }

    #[tokio::test]
    async fn commit_report_is_atomic() {
        let storage = MemoryStorage::default();
        let post = seed_post(&storage).await;
        let mut record = neutral("user-1", post.key());
        record.reported = true;

        let (stored, item) = storage
            .commit_report(&record, post.key(), ReportOutcome::Added)
            .await
            .expect("report");
        assert_eq!(stored.version, 1);
        assert_eq!((item.reported_count, item.obfuscated), (1, true));

        storage.mark_reviewed(post.key()).await.expect("review");
        let rejected = storage
            .commit_report(&neutral("user-2", post.key()), post.key(), ReportOutcome::Added)
            .await
            .expect_err("reviewed content");
        assert_eq!(rejected, StorageError::ContentReviewed);
        assert!(storage
            .get_engagement(&UserId::new("user-2"), post.content_id)
            .await
            .is_err());
    }
}
