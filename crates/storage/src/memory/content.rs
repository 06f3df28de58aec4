use async_trait::async_trait;
use hive_core::{ContentItem, ContentKey, CounterDelta};

use super::{MemoryStorage, State};
use crate::{ContentPage, ContentQuery, ContentStorage, StorageError};

impl State {
    pub(super) fn item_mut(&mut self, key: ContentKey) -> Result<&mut ContentItem, StorageError> {
        self.content
            .get_mut(&key.scope_id)
            .and_then(|scope| scope.get_mut(&key.content_id))
            .ok_or(StorageError::ContentNotFound)
    }
}

#[async_trait]
impl ContentStorage for MemoryStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        self.enter().await
    }

    async fn put_content(&self, item: &ContentItem) -> Result<(), StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;
        let scope = state.content.entry(item.scope_id).or_default();
        if scope.contains_key(&item.content_id) {
            return Err(StorageError::ContentExists);
        }
        scope.insert(item.content_id, item.clone());
        Ok(())
    }

    async fn get_content(&self, key: ContentKey) -> Result<ContentItem, StorageError> {
        self.enter().await?;
        let state = self.state.read().await;
        state
            .content
            .get(&key.scope_id)
            .and_then(|scope| scope.get(&key.content_id))
            .cloned()
            .ok_or(StorageError::ContentNotFound)
    }

    async fn query_content(&self, query: &ContentQuery) -> Result<ContentPage, StorageError> {
        self.enter().await?;
        if query.limit == 0 {
            return Err(StorageError::InvalidInput("query limit must be positive".to_owned()));
        }
        let state = self.state.read().await;
        let Some(scope) = state.content.get(&query.scope_id) else {
            return Ok(ContentPage::default());
        };

        let mut index: Vec<_> = scope
            .values()
            .map(|item| (item.index_key(query.sort), item))
            .filter(|(key, _)| {
                query
                    .start_after
                    .as_ref()
                    .map_or(true, |start| query.direction.is_after(key, start))
            })
            .collect();
        index.sort_by(|a, b| query.direction.compare(&a.0, &b.0));

        let window = query.limit.min(self.max_page_items);
        let exhausted = index.len() <= window;
        index.truncate(window);

        let last_evaluated = if exhausted {
            None
        } else {
            index.last().map(|(key, _)| *key)
        };
        let items = index
            .into_iter()
            .filter(|(_, item)| item.matches_tags(&query.tags))
            .map(|(_, item)| item.clone())
            .collect();

        Ok(ContentPage {
            items,
            last_evaluated,
        })
    }

    async fn adjust_counters(
        &self,
        key: ContentKey,
        delta: &CounterDelta,
    ) -> Result<ContentItem, StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;
        let item = state.item_mut(key)?;
        delta.apply_to(item);
        Ok(item.clone())
    }

    async fn touch_activity(&self, key: ContentKey, at: i64) -> Result<(), StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;
        let item = state.item_mut(key)?;
        item.last_activity_at = item.last_activity_at.max(at);
        Ok(())
    }

    async fn mark_reviewed(&self, key: ContentKey) -> Result<ContentItem, StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;
        let item = state.item_mut(key)?;
        item.reviewed = true;
        item.obfuscated = false;
        Ok(item.clone())
    }

    async fn set_pinned(
        &self,
        key: ContentKey,
        pinned: bool,
    ) -> Result<ContentItem, StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;
        let item = state.item_mut(key)?;
        item.pinned = pinned;
        Ok(item.clone())
    }

    async fn delete_content(&self, key: ContentKey) -> Result<(), StorageError> {
        self.enter().await?;
        let mut state = self.state.write().await;
        let scope = state
            .content
            .get_mut(&key.scope_id)
            .ok_or(StorageError::ContentNotFound)?;
        scope
            .remove(&key.content_id)
            .ok_or(StorageError::ContentNotFound)?;
        if scope.is_empty() {
            state.content.remove(&key.scope_id);
        }
        Ok(())
    }
}
