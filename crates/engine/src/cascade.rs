//! Cascade deleter.
//!
//! Deleting an item removes, in order: every child item (each with its own
//! cascade), the item's engagement records, and finally the item itself.
//! Child cascades and engagement batches fan out in a bounded [`TaskGroup`];
//! the parent is deleted only after the group has joined. Nothing here is
//! atomic, but re-running a cascade over a partially deleted tree finishes
//! the job.

use futures_util::future::{BoxFuture, FutureExt};
use hive_auth::{Caller, Role};
use hive_core::{ContentId, ContentKey, ContentKind, CounterDelta, EngagementKey, UserId};

use crate::backoff::Backoff;
use crate::deadline::sleep_within;
use crate::listing::Scan;
use crate::{Engine, EngineError, EngineResult, Target, TaskGroup};

impl Engine {
    /// Deletes an item and everything hanging off it. Deleting an item that
    /// is already gone succeeds.
    pub async fn delete_content(&self, caller: &Caller, target: Target) -> EngineResult<()> {
        let role = self.authorize(caller, target.hive_id).await?;
        let item = match self.load_target(target).await {
            Ok(item) => item,
            Err(EngineError::NotFound) => return Ok(()),
            Err(error) => return Err(error),
        };
        if item.author_id != caller.user_id && !role.permits(Role::Moderator) {
            return Err(EngineError::Unauthorized(
                "only the author or a moderator may delete content".to_owned(),
            ));
        }

        let deleted = self.cascade(item.key(), item.kind).await?;
        if deleted && item.kind == ContentKind::Comment {
            let post = ContentKey::new(item.hive_id, ContentId(item.scope_id.0));
            self.reconcile_or_log(post, CounterDelta::comments(-1), "comment deleted")
                .await;
        }
        tracing::info!(
            hive = %target.hive_id,
            content = %item.content_id,
            kind = item.kind.as_str(),
            "content deleted"
        );
        Ok(())
    }

    /// Returns whether this run removed the item itself.
    fn cascade(&self, key: ContentKey, kind: ContentKind) -> BoxFuture<'static, EngineResult<bool>> {
        let engine = self.clone();
        async move {
            let mut group = TaskGroup::new(engine.config.cascade_concurrency);
            let enumerated = engine.fan_out(key, kind, &mut group).await;
            let joined = group.join().await;
            enumerated?;
            joined?;

            match engine.call(engine.storage.delete_content(key)).await {
                Ok(()) => Ok(true),
                Err(error) if error.is_not_found() => Ok(false),
                Err(error) => Err(error.into()),
            }
        }
        .boxed()
    }

    async fn fan_out(
        &self,
        key: ContentKey,
        kind: ContentKind,
        group: &mut TaskGroup<()>,
    ) -> EngineResult<()> {
        if kind == ContentKind::Post {
            self.fan_out_children(key.content_id, group).await?;
        }
        self.fan_out_engagement(key.content_id, group).await
    }

    async fn fan_out_children(
        &self,
        post_id: ContentId,
        group: &mut TaskGroup<()>,
    ) -> EngineResult<()> {
        let mut start_after = None;
        loop {
            let collected = match self.collect(Scan::children(post_id.into(), start_after)).await {
                Ok(collected) => collected,
                Err(EngineError::NotFound) => return Ok(()),
                Err(error) => return Err(error),
            };
            for child in &collected.items {
                let engine = self.clone();
                let (key, kind) = (child.key(), child.kind);
                group.spawn(async move { engine.cascade(key, kind).await.map(|_| ()) });
            }
            match collected.next {
                Some(position) => start_after = Some(position),
                None => return Ok(()),
            }
        }
    }

    async fn fan_out_engagement(
        &self,
        content_id: ContentId,
        group: &mut TaskGroup<()>,
    ) -> EngineResult<()> {
        let mut start_after: Option<UserId> = None;
        loop {
            let page = match self.engagement_page(content_id, start_after).await {
                Ok(page) => page,
                Err(EngineError::NotFound) => return Ok(()),
                Err(error) => return Err(error),
            };
            if !page.records.is_empty() {
                let keys: Vec<EngagementKey> = page.records.iter().map(|r| r.key()).collect();
                let engine = self.clone();
                group.spawn(async move { engine.delete_batch(keys).await });
            }
            match page.last_evaluated {
                Some(user) => start_after = Some(user),
                None => return Ok(()),
            }
        }
    }

    /// Deletes one batch, retrying whatever the store leaves unprocessed (or
    /// fails on transiently) on the backoff ladder.
    pub(crate) async fn delete_batch(&self, keys: Vec<EngagementKey>) -> EngineResult<()> {
        let mut backoff = Backoff::new(self.config.backoff);
        let mut pending = keys;
        loop {
            let reason = match self
                .call(self.storage.batch_delete_engagement(&pending))
                .await
            {
                Ok(unprocessed) if unprocessed.is_empty() => return Ok(()),
                Ok(unprocessed) => {
                    pending = unprocessed;
                    format!("{} keys unprocessed", pending.len())
                }
                Err(error) if error.is_transient() => error.to_string(),
                Err(error) => return Err(error.into()),
            };

            let Some(delay) = backoff.next_delay() else {
                tracing::warn!(
                    attempts = backoff.attempts(),
                    remaining = pending.len(),
                    "batch delete gave up"
                );
                return Err(EngineError::RetriesExhausted {
                    attempts: backoff.attempts(),
                    remaining: pending.len(),
                });
            };
            tracing::warn!(
                attempt = backoff.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                %reason,
                "retrying batch delete"
            );
            sleep_within(self.deadline, delay).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hive_storage::{ContentStorage, EngagementStorage, MemoryStorageConfig};

    use super::*;
    use crate::test_support::{fixture, fixture_with, member, seed_post};
    use crate::{BackoffConfig, EngineConfig, VoteRequest};

    fn quick_backoff(max_attempts: u32) -> EngineConfig {
        EngineConfig {
            backoff: BackoffConfig {
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                max_attempts,
            },
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn only_author_or_moderator_may_delete() {
        let fixture = fixture().await;
        let post = seed_post(&fixture, 1, &[]).await;
        let target = Target::new(fixture.hive, post.key());
        let bob = member(&fixture, "bob").await;

        assert!(matches!(
            fixture.engine.delete_content(&bob, target).await,
            Err(EngineError::Unauthorized(_))
        ));
        fixture
            .engine
            .delete_content(&fixture.owner, target)
            .await
            .expect("delete");
        assert_eq!(fixture.storage.content_count().await, 0);
    }

    #[tokio::test]
    async fn deleting_a_comment_decrements_the_post() {
        let fixture = fixture().await;
        let post = fixture
            .engine
            .create_post(&fixture.owner, fixture.hive, "p".to_owned(), vec![])
            .await
            .expect("post");
        let comment = fixture
            .engine
            .create_comment(&fixture.owner, fixture.hive, post.content_id, "c".to_owned())
            .await
            .expect("comment");
        let comment_target = Target::new(fixture.hive, comment.key());
        fixture
            .engine
            .apply_vote(&fixture.owner, comment_target, VoteRequest::ADD_UP)
            .await
            .expect("vote");

        fixture
            .engine
            .delete_content(&fixture.owner, comment_target)
            .await
            .expect("delete comment");
        fixture
            .engine
            .delete_content(&fixture.owner, comment_target)
            .await
            .expect("delete again");

        let post = fixture
            .storage
            .get_content(post.key())
            .await
            .expect("post");
        assert_eq!(post.comment_count, 0);
        assert_eq!(fixture.storage.engagement_count().await, 0);
    }

    #[tokio::test]
    async fn unprocessed_keys_are_retried_until_done() {
        let fixture = fixture_with(MemoryStorageConfig::default(), quick_backoff(10)).await;
        let post = seed_post(&fixture, 1, &[]).await;
        let mut keys = Vec::new();
        for i in 0..20 {
            let record = hive_core::EngagementRecord::neutral(
                UserId::new(format!("user-{i:02}")),
                post.key(),
                fixture.hive,
            );
            keys.push(record.key());
            fixture
                .storage
                .put_engagement(&record)
                .await
                .expect("seed record");
        }
        fixture.storage.set_write_capacity(6);

        fixture.engine.delete_batch(keys).await.expect("delete batch");
        assert_eq!(fixture.storage.engagement_count().await, 0);
    }

    #[tokio::test]
    async fn retry_ceiling_surfaces_as_exhausted() {
        let fixture = fixture_with(MemoryStorageConfig::default(), quick_backoff(3)).await;
        let post = seed_post(&fixture, 1, &[]).await;
        let record =
            hive_core::EngagementRecord::neutral(UserId::new("u"), post.key(), fixture.hive);
        fixture
            .storage
            .put_engagement(&record)
            .await
            .expect("seed record");
        fixture.storage.set_write_capacity(0);

        assert_eq!(
            fixture.engine.delete_batch(vec![record.key()]).await,
            Err(EngineError::RetriesExhausted {
                attempts: 3,
                remaining: 1
            })
        );
    }
}
