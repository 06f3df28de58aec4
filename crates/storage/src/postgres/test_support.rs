use std::collections::BTreeSet;

use hive_core::{ContentItem, Direction, ScopeId, SortKey, TagId, UserId};
use sqlx::postgres::PgPoolOptions;

use super::PostgresStorage;
use crate::ContentQuery;

// Re-export the domain traits so test modules can `use super::super::test_support::*`
// and have every trait method available on PostgresStorage.
#[allow(unused_imports)]
pub(super) use crate::{ContentStorage, EngagementStorage, Storage, StorageError};

pub(super) async fn test_storage() -> Option<PostgresStorage> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(value) => value,
        Err(_) => return None,
    };

    // Each test gets its own schema for full isolation when running in parallel.
    let schema = format!("test_{}", uuid::Uuid::new_v4().simple());
    let mut opts: sqlx::postgres::PgConnectOptions =
        database_url.parse().expect("parse DATABASE_URL");
    opts = opts.options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_with(opts)
        .await
        .expect("connect test database");
    sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
        .execute(&pool)
        .await
        .expect("create test schema");

    crate::migrate_with_pool(&pool)
        .await
        .expect("apply migrations");
    Some(PostgresStorage::from_pool(pool))
}

pub(super) fn post(hive: ScopeId, created_at: i64, tags: &[TagId]) -> ContentItem {
    ContentItem::new_post(hive, UserId::new("author"), "body".to_owned(), created_at)
        .with_tags(tags.iter().copied())
}

pub(super) fn content_query(scope: ScopeId, direction: Direction, limit: usize) -> ContentQuery {
    ContentQuery {
        scope_id: scope,
        sort: SortKey::Created,
        direction,
        limit,
        start_after: None,
        tags: BTreeSet::new(),
    }
}
