use std::future::Future;
use std::time::Duration;

use hive_storage::StorageError;
use tokio::time::Instant;

use crate::{EngineError, EngineResult};

/// Point in time an operation must finish by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self { at: instant }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    #[must_use]
    pub fn earliest(self, other: Option<Self>) -> Self {
        match other {
            Some(other) => self.min(other),
            None => self,
        }
    }
}

/// Runs one store call under `deadline`; running out of time reads as a
/// store timeout.
pub(crate) async fn bounded<T, F>(deadline: Deadline, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout_at(deadline.at, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout),
    }
}

/// Sleeps for `delay` unless that would overrun `deadline`.
pub(crate) async fn sleep_within(deadline: Option<Deadline>, delay: Duration) -> EngineResult<()> {
    if let Some(deadline) = deadline {
        if deadline.remaining() <= delay {
            return Err(EngineError::deadline_exceeded());
        }
    }
    tokio::time::sleep(delay).await;
    Ok(())
}
