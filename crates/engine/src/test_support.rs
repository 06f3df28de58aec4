use std::sync::Arc;

use hive_auth::{Caller, Role, StaticDirectory};
use hive_core::{ContentItem, ScopeId, TagId};
use hive_storage::{ContentStorage, MemoryStorage, MemoryStorageConfig};

use crate::{Engine, EngineConfig};

pub(crate) struct Fixture {
    pub engine: Engine,
    pub storage: MemoryStorage,
    pub directory: Arc<StaticDirectory>,
    pub hive: ScopeId,
    pub owner: Caller,
}

pub(crate) async fn fixture() -> Fixture {
    fixture_with(MemoryStorageConfig::default(), EngineConfig::default()).await
}

pub(crate) async fn fixture_with(storage: MemoryStorageConfig, config: EngineConfig) -> Fixture {
    let storage = MemoryStorage::new(storage);
    let directory = Arc::new(StaticDirectory::new());
    let hive = ScopeId::new();
    let owner = Caller::user("owner");
    directory.create_hive(hive, &owner.user_id).await;

    let engine = Engine::new(Arc::new(storage.clone()), directory.clone()).with_config(config);
    Fixture {
        engine,
        storage,
        directory,
        hive,
        owner,
    }
}

pub(crate) async fn member(fixture: &Fixture, name: &str) -> Caller {
    let caller = Caller::user(name);
    fixture
        .directory
        .add_member(fixture.hive, &caller.user_id, Role::Member)
        .await
        .expect("add member");
    caller
}

/// Writes a post straight to the store with a fixed creation time.
pub(crate) async fn seed_post(fixture: &Fixture, created_at: i64, tags: &[TagId]) -> ContentItem {
    let post = ContentItem::new_post(
        fixture.hive,
        fixture.owner.user_id.clone(),
        format!("post {created_at}"),
        created_at,
    )
    .with_tags(tags.iter().copied());
    fixture
        .storage
        .put_content(&post)
        .await
        .expect("seed post");
    post
}
