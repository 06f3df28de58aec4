#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hive_auth::{Caller, Role, StaticDirectory};
use hive_core::ScopeId;
use hive_engine::{BackoffConfig, Engine, EngineConfig};
use hive_storage::{MemoryStorage, MemoryStorageConfig};

pub struct Hive {
    pub engine: Engine,
    pub storage: MemoryStorage,
    pub directory: Arc<StaticDirectory>,
    pub id: ScopeId,
    pub owner: Caller,
}

impl Hive {
    pub async fn new() -> Self {
        Self::with(MemoryStorageConfig::default(), EngineConfig::default()).await
    }

    pub async fn with(storage: MemoryStorageConfig, config: EngineConfig) -> Self {
        let storage = MemoryStorage::new(storage);
        let directory = Arc::new(StaticDirectory::new());
        let id = ScopeId::new();
        let owner = Caller::user("owner");
        directory.create_hive(id, &owner.user_id).await;
        let engine = Engine::new(Arc::new(storage.clone()), directory.clone()).with_config(config);
        Self {
            engine,
            storage,
            directory,
            id,
            owner,
        }
    }

    pub async fn member(&self, name: &str) -> Caller {
        let caller = Caller::user(name);
        self.directory
            .add_member(self.id, &caller.user_id, Role::Member)
            .await
            .expect("add member");
        caller
    }
}

pub fn quick_backoff(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        backoff: BackoffConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts,
        },
        ..EngineConfig::default()
    }
}
