use hive_core::{ContentItem, ContentKey, CounterDelta};

use crate::{Engine, EngineResult};

impl Engine {
    /// Applies `delta` to the item's aggregate counters with the store's
    /// conditional arithmetic, flooring every counter at zero. A zero delta
    /// issues no write and returns `None`.
    pub(crate) async fn reconcile(
        &self,
        key: ContentKey,
        delta: CounterDelta,
    ) -> EngineResult<Option<ContentItem>> {
        if delta.is_zero() {
            return Ok(None);
        }
        let item = self
            .call(self.storage.adjust_counters(key, &delta))
            .await?;
        tracing::debug!(
            content = %key.content_id,
            up = item.up_vote_count,
            down = item.down_vote_count,
            comments = item.comment_count,
            "counters reconciled"
        );
        Ok(Some(item))
    }

    /// Reconciliation for side effects of an operation that has already
    /// succeeded. Failures are logged and dropped.
    pub(crate) async fn reconcile_or_log(
        &self,
        key: ContentKey,
        delta: CounterDelta,
        context: &'static str,
    ) {
        if let Err(error) = self.reconcile(key, delta).await {
            tracing::warn!(
                content = %key.content_id,
                context,
                error = %error,
                "counter reconciliation failed"
            );
        }
    }
}
