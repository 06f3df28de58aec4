use std::collections::HashMap;

use async_trait::async_trait;
use hive_core::{
    ContentId, ContentItem, ContentKey, CounterDelta, EngagementKey, EngagementRecord,
    ReportOutcome, ScopeId, UserId,
};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::content::{adjust_counters_with, ContentRow, CONTENT_COLUMNS};
use super::{db_error, not_found_or, to_i64, PostgresStorage};
use crate::{check_batch_size, EngagementPage, EngagementQuery, EngagementStorage, StorageError};

const ENGAGEMENT_COLUMNS: &str = r#"
    user_id,
    content_id,
    scope_id,
    hive_id,
    up_voted,
    down_voted,
    saved,
    reported,
    voted_at_us,
    reported_reason,
    version
"#;

/// Conditional write keyed on the record's version: insert when it has never
/// been stored, otherwise update only if nobody else wrote in between.
async fn write_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &EngagementRecord,
) -> Result<EngagementRecord, StorageError> {
    let sql = if record.is_stored() {
        format!(
            r#"
            UPDATE engagement_records
            SET up_voted = $5,
                down_voted = $6,
                saved = $7,
                reported = $8,
                voted_at_us = $9,
                reported_reason = $10,
                version = version + 1
            WHERE user_id = $1 AND content_id = $2 AND version = $11
              AND scope_id = $3 AND hive_id = $4
            RETURNING {ENGAGEMENT_COLUMNS}
            "#
        )
    } else {
        format!(
            r#"
            INSERT INTO engagement_records (
                user_id, content_id, scope_id, hive_id,
                up_voted, down_voted, saved, reported,
                voted_at_us, reported_reason, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11 + 1)
            ON CONFLICT (user_id, content_id) DO NOTHING
            RETURNING {ENGAGEMENT_COLUMNS}
            "#
        )
    };
    let row = sqlx::query_as::<_, EngagementRow>(&sql)
        .bind(record.user_id.as_str())
        .bind(record.content_id.0)
        .bind(record.scope_id.0)
        .bind(record.hive_id.0)
        .bind(record.up_voted)
        .bind(record.down_voted)
        .bind(record.saved)
        .bind(record.reported)
        .bind(record.voted_at)
        .bind(record.reported_reason.as_deref())
        .bind(record.version)
        .fetch_optional(tx.as_mut())
        .await
        .map_err(db_error)?;
    row.map(EngagementRecord::from)
        .ok_or(StorageError::VersionConflict)
}

#[async_trait]
impl EngagementStorage for PostgresStorage {
    async fn get_engagement(
        &self,
        user_id: &UserId,
        content_id: ContentId,
    ) -> Result<EngagementRecord, StorageError> {
        let sql = format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records WHERE user_id = $1 AND content_id = $2"
        );
        let row = sqlx::query_as::<_, EngagementRow>(&sql)
            .bind(user_id.as_str())
            .bind(content_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| not_found_or(error, StorageError::RecordNotFound))?;
        Ok(row.into())
    }

    async fn batch_get_engagement(
        &self,
        user_id: &UserId,
        content_ids: &[ContentId],
    ) -> Result<HashMap<ContentId, EngagementRecord>, StorageError> {
        if content_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<Uuid> = content_ids.iter().map(|id| id.0).collect();
        let sql = format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records WHERE user_id = $1 AND content_id = ANY($2)"
        );
        let rows = sqlx::query_as::<_, EngagementRow>(&sql)
            .bind(user_id.as_str())
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let record = EngagementRecord::from(row);
                (record.content_id, record)
            })
            .collect())
    }

    async fn put_engagement(
        &self,
        record: &EngagementRecord,
    ) -> Result<EngagementRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let stored = write_record(&mut tx, record).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn commit_report(
        &self,
        record: &EngagementRecord,
        content: ContentKey,
        outcome: ReportOutcome,
    ) -> Result<(EngagementRecord, ContentItem), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE scope_id = $1 AND content_id = $2 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(content.scope_id.0)
            .bind(content.content_id.0)
            .fetch_one(tx.as_mut())
            .await
            .map_err(|error| not_found_or(error, StorageError::ContentNotFound))?;
        let mut item = ContentItem::try_from(row)?;
        if outcome == ReportOutcome::Added && item.reviewed {
            return Err(StorageError::ContentReviewed);
        }

        let stored = write_record(&mut tx, record).await?;
        outcome.apply_to(&mut item);
        sqlx::query(
            r#"
            UPDATE content_items
            SET reported_count = $3, obfuscated = $4
            WHERE scope_id = $1 AND content_id = $2
            "#,
        )
        .bind(content.scope_id.0)
        .bind(content.content_id.0)
        .bind(item.reported_count)
        .bind(item.obfuscated)
        .execute(tx.as_mut())
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok((stored, item))
    }

    async fn commit_vote(
        &self,
        record: &EngagementRecord,
        content: ContentKey,
        delta: &CounterDelta,
    ) -> Result<(EngagementRecord, ContentItem), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        // The counter update takes the row lock first, so a vanished item fails
        // before the record is touched.
        let item = adjust_counters_with(tx.as_mut(), content, delta).await?;
        let stored = write_record(&mut tx, record).await?;
        tx.commit().await.map_err(db_error)?;
        Ok((stored, item))
    }

    async fn query_engagement(
        &self,
        query: &EngagementQuery,
    ) -> Result<EngagementPage, StorageError> {
        if query.limit == 0 {
            return Err(StorageError::InvalidInput(
                "query limit must be positive".to_owned(),
            ));
        }
        let sql = format!(
            r#"
            SELECT {ENGAGEMENT_COLUMNS}
            FROM engagement_records
            WHERE content_id = $1
              AND ($2::TEXT IS NULL OR user_id > $2)
            ORDER BY user_id ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, EngagementRow>(&sql)
            .bind(query.content_id.0)
            .bind(query.start_after.as_ref().map(UserId::as_str))
            .bind(to_i64(query.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let full_page = rows.len() == query.limit;
        let records: Vec<EngagementRecord> = rows.into_iter().map(Into::into).collect();
        let last_evaluated = if full_page {
            records.last().map(|record| record.user_id.clone())
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
        check_batch_size(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let users: Vec<&str> = keys.iter().map(|key| key.user_id.as_str()).collect();
        let contents: Vec<Uuid> = keys.iter().map(|key| key.content_id.0).collect();
        sqlx::query(
            r#"
            DELETE FROM engagement_records
            WHERE (user_id, content_id) IN (
                SELECT * FROM UNNEST($1::TEXT[], $2::UUID[])
            )
            "#,
        )
        .bind(users)
        .bind(contents)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(Vec::new())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EngagementRow {
    user_id: String,
    content_id: Uuid,
    scope_id: Uuid,
    hive_id: Uuid,
    up_voted: bool,
    down_voted: bool,
    saved: bool,
    reported: bool,
    voted_at_us: Option<i64>,
    reported_reason: Option<String>,
    version: i64,
}

impl From<EngagementRow> for EngagementRecord {
    fn from(value: EngagementRow) -> Self {
        Self {
            user_id: UserId(value.user_id),
            content_id: ContentId(value.content_id),
            scope_id: ScopeId(value.scope_id),
            hive_id: ScopeId(value.hive_id),
            up_voted: value.up_voted,
            down_voted: value.down_voted,
            saved: value.saved,
            reported: value.reported,
            voted_at: value.voted_at_us,
            reported_reason: value.reported_reason,
            version: value.version,
        }
    }
}
