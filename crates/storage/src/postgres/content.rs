use async_trait::async_trait;
use hive_core::{
    ContentId, ContentItem, ContentKey, ContentKind, CounterDelta, Direction, ScopeId, SortKey,
    TagId, UserId,
};
use uuid::Uuid;

use super::{db_error, is_unique_violation, not_found_or, to_i64, PostgresStorage};
use crate::{ContentPage, ContentQuery, ContentStorage, StorageError};

pub(super) const CONTENT_COLUMNS: &str = r#"
    scope_id,
    content_id,
    hive_id,
    kind,
    author_id,
    body,
    created_at_us,
    last_activity_at_us,
    up_vote_count,
    down_vote_count,
    comment_count,
    reported_count,
    obfuscated,
    reviewed,
    pinned,
    tag_ids
"#;

fn sort_column(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Created => "created_at_us",
        SortKey::LastActivity => "last_activity_at_us",
    }
}

/// Conditional arithmetic update shared by the plain counter path and the
/// vote transaction.
pub(super) async fn adjust_counters_with<'e, E>(
    executor: E,
    key: ContentKey,
    delta: &CounterDelta,
) -> Result<ContentItem, StorageError>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!(
        r#"
        UPDATE content_items
        SET up_vote_count = GREATEST(0, up_vote_count + $3),
            down_vote_count = GREATEST(0, down_vote_count + $4),
            comment_count = GREATEST(0, comment_count + $5),
            reported_count = GREATEST(0, reported_count + $6)
        WHERE scope_id = $1 AND content_id = $2
        RETURNING {CONTENT_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ContentRow>(&sql)
        .bind(key.scope_id.0)
        .bind(key.content_id.0)
        .bind(delta.up_votes)
        .bind(delta.down_votes)
        .bind(delta.comments)
        .bind(delta.reports)
        .fetch_one(executor)
        .await
        .map_err(|error| not_found_or(error, StorageError::ContentNotFound))?;
    ContentItem::try_from(row)
}

#[async_trait]
impl ContentStorage for PostgresStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn put_content(&self, item: &ContentItem) -> Result<(), StorageError> {
        let tag_ids: Vec<Uuid> = item.tag_ids.iter().map(|tag| tag.0).collect();
        sqlx::query(
            r#"
            INSERT INTO content_items (
                scope_id, content_id, hive_id, kind, author_id, body,
                created_at_us, last_activity_at_us,
                up_vote_count, down_vote_count, comment_count, reported_count,
                obfuscated, reviewed, pinned, tag_ids
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(item.scope_id.0)
        .bind(item.content_id.0)
        .bind(item.hive_id.0)
        .bind(item.kind.as_str())
        .bind(item.author_id.as_str())
        .bind(&item.body)
        .bind(item.created_at)
        .bind(item.last_activity_at)
        .bind(item.up_vote_count)
        .bind(item.down_vote_count)
        .bind(item.comment_count)
        .bind(item.reported_count)
        .bind(item.obfuscated)
        .bind(item.reviewed)
        .bind(item.pinned)
        .bind(tag_ids)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                StorageError::ContentExists
            } else {
                db_error(error)
            }
        })?;
        Ok(())
    }

    async fn get_content(&self, key: ContentKey) -> Result<ContentItem, StorageError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE scope_id = $1 AND content_id = $2"
        );
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(key.scope_id.0)
            .bind(key.content_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| not_found_or(error, StorageError::ContentNotFound))?;
        ContentItem::try_from(row)
    }

    async fn query_content(&self, query: &ContentQuery) -> Result<ContentPage, StorageError> {
        if query.limit == 0 {
            return Err(StorageError::InvalidInput(
                "query limit must be positive".to_owned(),
            ));
        }
        let column = sort_column(query.sort);
        let (comparison, order) = match query.direction {
            Direction::Ascending => (">", "ASC"),
            Direction::Descending => ("<", "DESC"),
        };
        // Column and operator come from the fixed tables above; values are bound.
        let sql = format!(
            r#"
            SELECT {CONTENT_COLUMNS}
            FROM content_items
            WHERE scope_id = $1
              AND ($2::BIGINT IS NULL OR ({column}, content_id) {comparison} ($2, $3::UUID))
              AND (cardinality($4::UUID[]) = 0 OR tag_ids && $4::UUID[])
            ORDER BY {column} {order}, content_id {order}
            LIMIT $5
            "#
        );
        let tags: Vec<Uuid> = query.tags.iter().map(|tag| tag.0).collect();
        let rows = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(query.scope_id.0)
            .bind(query.start_after.map(|start| start.sort_value))
            .bind(query.start_after.map(|start| start.content_id.0))
            .bind(tags)
            .bind(to_i64(query.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let full_page = rows.len() == query.limit;
        let items = rows
            .into_iter()
            .map(ContentItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let last_evaluated = if full_page {
            items.last().map(|item| item.index_key(query.sort))
        } else {
            None
        };
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
        adjust_counters_with(&self.pool, key, delta).await
    }

    async fn touch_activity(&self, key: ContentKey, at: i64) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET last_activity_at_us = GREATEST(last_activity_at_us, $3)
            WHERE scope_id = $1 AND content_id = $2
            "#,
        )
        .bind(key.scope_id.0)
        .bind(key.content_id.0)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::ContentNotFound);
        }
        Ok(())
    }

    async fn mark_reviewed(&self, key: ContentKey) -> Result<ContentItem, StorageError> {
        let sql = format!(
            r#"
            UPDATE content_items
            SET reviewed = TRUE, obfuscated = FALSE
            WHERE scope_id = $1 AND content_id = $2
            RETURNING {CONTENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(key.scope_id.0)
            .bind(key.content_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| not_found_or(error, StorageError::ContentNotFound))?;
        ContentItem::try_from(row)
    }

    async fn set_pinned(
        &self,
        key: ContentKey,
        pinned: bool,
    ) -> Result<ContentItem, StorageError> {
        let sql = format!(
            r#"
            UPDATE content_items
            SET pinned = $3
            WHERE scope_id = $1 AND content_id = $2
            RETURNING {CONTENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(key.scope_id.0)
            .bind(key.content_id.0)
            .bind(pinned)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| not_found_or(error, StorageError::ContentNotFound))?;
        ContentItem::try_from(row)
    }

    async fn delete_content(&self, key: ContentKey) -> Result<(), StorageError> {
        let result =
            sqlx::query("DELETE FROM content_items WHERE scope_id = $1 AND content_id = $2")
                .bind(key.scope_id.0)
                .bind(key.content_id.0)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::ContentNotFound);
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ContentRow {
    scope_id: Uuid,
    content_id: Uuid,
    hive_id: Uuid,
    kind: String,
    author_id: String,
    body: String,
    created_at_us: i64,
    last_activity_at_us: i64,
    up_vote_count: i64,
    down_vote_count: i64,
    comment_count: i64,
    reported_count: i64,
    obfuscated: bool,
    reviewed: bool,
    pinned: bool,
    tag_ids: Vec<Uuid>,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = StorageError;

    fn try_from(value: ContentRow) -> Result<Self, Self::Error> {
        let kind = ContentKind::parse(&value.kind).ok_or_else(|| {
            StorageError::Database(format!("unexpected content kind: {}", value.kind))
        })?;
        Ok(Self {
            scope_id: ScopeId(value.scope_id),
            content_id: ContentId(value.content_id),
            hive_id: ScopeId(value.hive_id),
            kind,
            author_id: UserId(value.author_id),
            body: value.body,
            created_at: value.created_at_us,
            last_activity_at: value.last_activity_at_us,
            up_vote_count: value.up_vote_count,
            down_vote_count: value.down_vote_count,
            comment_count: value.comment_count,
            reported_count: value.reported_count,
            obfuscated: value.obfuscated,
            reviewed: value.reviewed,
            pinned: value.pinned,
            tag_ids: value.tag_ids.into_iter().map(TagId).collect(),
        })
    }
}
