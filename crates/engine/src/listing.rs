//! Paged query executor.
//!
//! A store round-trip evaluates a bounded slice of a secondary index and, when
//! a tag filter is set, drops non-matching items after the scan. One round
//! can therefore return fewer items than asked for even though more remain,
//! so the executor keeps issuing rounds from the store's resume point until
//! the caller's limit is met or the index is exhausted.

use std::collections::BTreeSet;

use hive_auth::Caller;
use hive_core::validation::{validate_tag_count, MAX_TAG_FILTER};
use hive_core::{
    sort_items, ContentId, ContentItem, ContentKey, ContentKind, Cursor, CursorContext, Direction,
    IndexKey, ScopeId, SortKey, TagId, UserId,
};
use hive_storage::{ContentQuery, EngagementPage, EngagementQuery, MAX_BATCH_WRITE};

use crate::{Engine, EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Hive for a post listing, post id for a comment listing.
    pub scope_id: ScopeId,
    /// Zero or negative selects the configured default.
    pub limit: i64,
    pub sort: SortKey,
    pub direction: Direction,
    /// Matches items carrying any of these tags. Empty matches everything.
    pub tags: BTreeSet<TagId>,
    pub cursor: Option<String>,
}

impl ListRequest {
    /// Posts of a hive, newest first.
    #[must_use]
    pub fn posts(hive_id: ScopeId) -> Self {
        Self {
            scope_id: hive_id,
            limit: 0,
            sort: SortKey::Created,
            direction: Direction::Descending,
            tags: BTreeSet::new(),
            cursor: None,
        }
    }

    /// Comments of a post in the order they were written.
    #[must_use]
    pub fn comments(post_id: ContentId) -> Self {
        Self {
            scope_id: post_id.into(),
            limit: 0,
            sort: SortKey::Created,
            direction: Direction::Ascending,
            tags: BTreeSet::new(),
            cursor: None,
        }
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn tags(mut self, tags: impl IntoIterator<Item = TagId>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub items: Vec<ContentItem>,
    /// `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Executor input with the cursor already decoded.
#[derive(Debug, Clone)]
pub(crate) struct Scan {
    pub scope_id: ScopeId,
    pub sort: SortKey,
    pub direction: Direction,
    pub tags: BTreeSet<TagId>,
    pub limit: usize,
    pub start_after: Option<IndexKey>,
}

impl Scan {
    /// Every item of a scope in index order, a batch at a time.
    pub(crate) fn children(scope_id: ScopeId, start_after: Option<IndexKey>) -> Self {
        Self {
            scope_id,
            sort: SortKey::Created,
            direction: Direction::Ascending,
            tags: BTreeSet::new(),
            limit: MAX_BATCH_WRITE,
            start_after,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Collected {
    pub items: Vec<ContentItem>,
    pub next: Option<IndexKey>,
}

impl Engine {
    /// Lists posts of `hive_id`, or comments of a post inside it when the
    /// request is scoped to a post.
    pub async fn list_content(
        &self,
        caller: &Caller,
        hive_id: ScopeId,
        request: ListRequest,
    ) -> EngineResult<ListPage> {
        self.authorize(caller, hive_id).await?;
        if request.scope_id != hive_id {
            let post = self
                .call(
                    self.storage
                        .get_content(ContentKey::new(hive_id, ContentId(request.scope_id.0))),
                )
                .await?;
            if post.kind != ContentKind::Post {
                return Err(EngineError::BadRequest(
                    "only posts have comment listings".to_owned(),
                ));
            }
        }
        self.list(request).await
    }

    pub(crate) async fn list(&self, request: ListRequest) -> EngineResult<ListPage> {
        validate_tag_count(request.tags.len(), MAX_TAG_FILTER)?;
        let limit = if request.limit <= 0 {
            self.config.default_limit
        } else {
            usize::try_from(request.limit).unwrap_or(usize::MAX)
        };

        let context = CursorContext::new(
            request.scope_id,
            request.sort,
            request.direction,
            &request.tags,
        );
        let start_after = request
            .cursor
            .as_deref()
            .map(|encoded| Cursor::decode(encoded, &context))
            .transpose()?
            .map(|cursor| cursor.position);

        let collected = self
            .collect(Scan {
                scope_id: request.scope_id,
                sort: request.sort,
                direction: request.direction,
                tags: request.tags,
                limit,
                start_after,
            })
            .await?;
        let next_cursor = collected
            .next
            .map(|position| Cursor::new(context, position.content_id, position.sort_value).encode());
        Ok(ListPage {
            items: collected.items,
            next_cursor,
        })
    }

    /// Accumulates store rounds until `scan.limit` items are held or the
    /// index runs out, then trims to the limit.
    pub(crate) async fn collect(&self, scan: Scan) -> EngineResult<Collected> {
        let limit = scan.limit.max(1);
        let round_size = if limit <= self.config.store_page_size {
            self.config.store_page_size
        } else {
            limit
        };

        let mut accumulated: Vec<ContentItem> = Vec::new();
        let mut start_after = scan.start_after;
        let mut exhausted = false;
        let mut rounds = 0u32;
        while accumulated.len() < limit && !exhausted {
            let query = ContentQuery {
                scope_id: scan.scope_id,
                sort: scan.sort,
                direction: scan.direction,
                limit: round_size,
                start_after,
                tags: scan.tags.clone(),
            };
            let page = self.call(self.storage.query_content(&query)).await?;
            rounds += 1;
            tracing::debug!(
                scope = %scan.scope_id,
                round = rounds,
                returned = page.items.len(),
                held = accumulated.len(),
                "listing round"
            );

            accumulated.extend(page.items);
            sort_items(&mut accumulated, scan.sort, scan.direction);
            match page.last_evaluated {
                Some(position) => start_after = Some(position),
                None => exhausted = true,
            }
        }

        let next = if accumulated.len() > limit {
            accumulated.truncate(limit);
            accumulated.last().map(|item| item.index_key(scan.sort))
        } else if accumulated.len() == limit && !exhausted {
            accumulated.last().map(|item| item.index_key(scan.sort))
        } else {
            None
        };
        Ok(Collected {
            items: accumulated,
            next,
        })
    }

    /// One page of the engagement reverse index, sized to a single batch write.
    pub(crate) async fn engagement_page(
        &self,
        content_id: ContentId,
        start_after: Option<UserId>,
    ) -> EngineResult<EngagementPage> {
        let query = EngagementQuery {
            content_id,
            limit: MAX_BATCH_WRITE,
            start_after,
        };
        Ok(self.call(self.storage.query_engagement(&query)).await?)
    }
}

#[cfg(test)]
mod tests {
    use hive_storage::MemoryStorageConfig;

    use super::*;
    use crate::test_support::{fixture_with, seed_post};
    use crate::EngineConfig;

    #[tokio::test]
    async fn filtered_listing_spans_several_rounds() {
        let fixture = fixture_with(
            MemoryStorageConfig {
                max_page_items: 4,
                ..MemoryStorageConfig::default()
            },
            EngineConfig::default(),
        )
        .await;
        let wanted = TagId::new();
        let other = TagId::new();
        for created in 1..=20 {
            let tag = if created % 3 == 0 { wanted } else { other };
            seed_post(&fixture, created, &[tag]).await;
        }

        let page = fixture
            .engine
            .list(ListRequest::posts(fixture.hive).limit(4).tags([wanted]))
            .await
            .expect("list");
        let created: Vec<i64> = page.items.iter().map(|item| item.created_at).collect();
        assert_eq!(created, vec![18, 15, 12, 9]);
        assert!(page.next_cursor.is_some());

        let rest = fixture
            .engine
            .list(
                ListRequest::posts(fixture.hive)
                    .limit(4)
                    .tags([wanted])
                    .cursor(page.next_cursor),
            )
            .await
            .expect("list rest");
        let created: Vec<i64> = rest.items.iter().map(|item| item.created_at).collect();
        assert_eq!(created, vec![6, 3]);
        assert!(rest.next_cursor.is_none());
    }

    #[tokio::test]
    async fn cursor_from_another_listing_is_rejected() {
        let fixture = crate::test_support::fixture().await;
        for created in 1..=3 {
            seed_post(&fixture, created, &[]).await;
        }
        let page = fixture
            .engine
            .list(ListRequest::posts(fixture.hive).limit(1))
            .await
            .expect("list");

        let replayed = fixture
            .engine
            .list(
                ListRequest::posts(fixture.hive)
                    .limit(1)
                    .sort(SortKey::LastActivity)
                    .cursor(page.next_cursor.clone()),
            )
            .await;
        assert!(matches!(replayed, Err(EngineError::BadRequest(_))));

        let garbage = fixture
            .engine
            .list(ListRequest::posts(fixture.hive).cursor(Some("%%%".to_owned())))
            .await;
        assert!(matches!(garbage, Err(EngineError::BadRequest(_))));
    }

    #[tokio::test]
    async fn exact_fit_on_an_exhausted_index_has_no_cursor() {
        let fixture = crate::test_support::fixture().await;
        for created in 1..=5 {
            seed_post(&fixture, created, &[]).await;
        }
        let page = fixture
            .engine
            .list(ListRequest::posts(fixture.hive).limit(5))
            .await
            .expect("list");
        assert_eq!(page.items.len(), 5);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn empty_scope_is_an_empty_page() {
        let fixture = crate::test_support::fixture().await;
        let page = fixture
            .engine
            .list(ListRequest::posts(fixture.hive))
            .await
            .expect("list");
        assert_eq!(page, ListPage::default());
    }
}
