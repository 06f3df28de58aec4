use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ContentId, ScopeId, TagId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    Post,
    Comment,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

/// Primary key of a content item: the partition plus the item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub scope_id: ScopeId,
    pub content_id: ContentId,
}

impl ContentKey {
    #[must_use]
    pub fn new(scope_id: ScopeId, content_id: ContentId) -> Self {
        Self {
            scope_id,
            content_id,
        }
    }
}

/// Secondary index a listing is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    Created,
    LastActivity,
}

impl SortKey {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Created => 1,
            Self::LastActivity => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Ascending => 1,
            Self::Descending => 2,
        }
    }

    /// Orders two index positions the way a scan in this direction visits them.
    #[must_use]
    pub fn compare(self, a: &IndexKey, b: &IndexKey) -> Ordering {
        match self {
            Self::Ascending => a.cmp(b),
            Self::Descending => b.cmp(a),
        }
    }

    /// True when `candidate` comes strictly after `position` in scan order.
    #[must_use]
    pub fn is_after(self, candidate: &IndexKey, position: &IndexKey) -> bool {
        self.compare(candidate, position) == Ordering::Greater
    }
}

/// Position of an item inside one secondary index of its scope.
///
/// Ordered by sort value first and content id second, so items sharing a
/// timestamp still have a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub sort_value: i64,
    pub content_id: ContentId,
}

/// A post or a comment together with its denormalized counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub scope_id: ScopeId,
    pub content_id: ContentId,
    /// Hive the item ultimately belongs to. Equal to `scope_id` for posts.
    pub hive_id: ScopeId,
    pub kind: ContentKind,
    pub author_id: UserId,
    pub body: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub up_vote_count: i64,
    pub down_vote_count: i64,
    pub comment_count: i64,
    pub reported_count: i64,
    pub obfuscated: bool,
    pub reviewed: bool,
    pub pinned: bool,
    pub tag_ids: BTreeSet<TagId>,
}

impl ContentItem {
    #[must_use]
    pub fn new_post(hive_id: ScopeId, author_id: UserId, body: String, created_at: i64) -> Self {
        Self::new(
            hive_id,
            hive_id,
            ContentKind::Post,
            author_id,
            body,
            created_at,
        )
    }

    #[must_use]
    pub fn new_comment(
        hive_id: ScopeId,
        post_id: ContentId,
        author_id: UserId,
        body: String,
        created_at: i64,
    ) -> Self {
        Self::new(
            post_id.into(),
            hive_id,
            ContentKind::Comment,
            author_id,
            body,
            created_at,
        )
    }

    fn new(
        scope_id: ScopeId,
        hive_id: ScopeId,
        kind: ContentKind,
        author_id: UserId,
        body: String,
        created_at: i64,
    ) -> Self {
        Self {
            scope_id,
            content_id: ContentId::new(),
            hive_id,
            kind,
            author_id,
            body,
            created_at,
            last_activity_at: created_at,
            up_vote_count: 0,
            down_vote_count: 0,
            comment_count: 0,
            reported_count: 0,
            obfuscated: false,
            reviewed: false,
            pinned: false,
            tag_ids: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagId>) -> Self {
        self.tag_ids = tags.into_iter().collect();
        self
    }

    #[must_use]
    pub fn key(&self) -> ContentKey {
        ContentKey::new(self.scope_id, self.content_id)
    }

    #[must_use]
    pub fn sort_value(&self, sort: SortKey) -> i64 {
        match sort {
            SortKey::Created => self.created_at,
            SortKey::LastActivity => self.last_activity_at,
        }
    }

    #[must_use]
    pub fn index_key(&self, sort: SortKey) -> IndexKey {
        IndexKey {
            sort_value: self.sort_value(sort),
            content_id: self.content_id,
        }
    }

    /// Tag filters are a logical OR; an empty filter matches everything.
    #[must_use]
    pub fn matches_tags(&self, filter: &BTreeSet<TagId>) -> bool {
        filter.is_empty() || filter.iter().any(|tag| self.tag_ids.contains(tag))
    }
}

/// Sorts items into scan order for the given index and direction.
pub fn sort_items(items: &mut [ContentItem], sort: SortKey, direction: Direction) {
    items.sort_by(|a, b| direction.compare(&a.index_key(sort), &b.index_key(sort)));
}
