#![forbid(unsafe_code)]

//! Pagination and engagement engine for hives, posts and comments.
//!
//! [`Engine`] is an immutable handle built once at start-up around the store,
//! the membership collaborator and the notifier. Every operation takes the
//! resolved [`Caller`] and checks hive membership before touching the store.

mod backoff;
mod cascade;
mod content;
mod counters;
mod deadline;
mod error;
mod group;
mod ledger;
mod listing;
mod notify;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hive_auth::{Caller, Role, ScopeAccess};
use hive_core::{now_micros, ContentKey, ScopeId};
use hive_storage::{Storage, StorageError};

pub use backoff::{Backoff, BackoffConfig};
pub use deadline::Deadline;
pub use error::{EngineError, EngineResult};
pub use group::TaskGroup;
pub use ledger::VoteRequest;
pub use listing::{ListPage, ListRequest};
pub use notify::{LogNotifier, NoopNotifier, Notification, Notifier, NotifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size used when a listing asks for zero or fewer items.
    pub default_limit: usize,
    /// Items requested per store round-trip for small listings.
    pub store_page_size: usize,
    /// Concurrent units per cascade fan-out.
    pub cascade_concurrency: usize,
    pub backoff: BackoffConfig,
    /// Upper bound on any single store call.
    pub store_call_timeout: Duration,
    /// Re-reads allowed when an engagement write loses a version race.
    pub write_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: 25,
            store_page_size: 25,
            cascade_concurrency: 8,
            backoff: BackoffConfig::default(),
            store_call_timeout: Duration::from_secs(5),
            write_conflict_retries: 3,
        }
    }
}

/// A content item addressed within its hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub hive_id: ScopeId,
    pub content: ContentKey,
}

impl Target {
    #[must_use]
    pub fn new(hive_id: ScopeId, content: ContentKey) -> Self {
        Self { hive_id, content }
    }
}

/// Microsecond timestamps that never repeat or go backwards within a process.
#[derive(Debug, Default)]
struct Clock {
    last: AtomicI64,
}

impl Clock {
    fn now(&self) -> i64 {
        let wall = now_micros();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    storage: Arc<dyn Storage>,
    access: Arc<dyn ScopeAccess>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    clock: Arc<Clock>,
    deadline: Option<Deadline>,
}

impl Engine {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, access: Arc<dyn ScopeAccess>) -> Self {
        Self {
            storage,
            access,
            notifier: Arc::new(NoopNotifier),
            config: EngineConfig::default(),
            clock: Arc::new(Clock::default()),
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// A handle whose operations, store calls and backoff sleeps included,
    /// all finish by `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Deadline) -> Self {
        let mut engine = self.clone();
        engine.deadline = Some(deadline.earliest(self.deadline));
        engine
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn ping(&self) -> EngineResult<()> {
        self.call(self.storage.ping()).await?;
        Ok(())
    }

    /// Runs one store call bounded by the per-call timeout and the handle's
    /// overall deadline.
    async fn call<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let deadline = Deadline::after(self.config.store_call_timeout).earliest(self.deadline);
        if deadline.is_expired() {
            return Err(StorageError::Timeout);
        }
        deadline::bounded(deadline, call).await
    }

    async fn authorize(&self, caller: &Caller, hive_id: ScopeId) -> EngineResult<Role> {
        Ok(self.access.check_member(caller, hive_id).await?)
    }

    async fn authorize_role(
        &self,
        caller: &Caller,
        hive_id: ScopeId,
        required: Role,
    ) -> EngineResult<Role> {
        Ok(self.access.require_role(caller, hive_id, required).await?)
    }
}
