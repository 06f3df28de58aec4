use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::{EngineError, EngineResult};

/// Bounded fan-out with a join barrier.
///
/// At most `limit` spawned units run at once. The first error becomes the
/// group's result; units already running are left to finish, units still
/// waiting for a slot are skipped.
pub struct TaskGroup<T> {
    tasks: JoinSet<EngineResult<Option<T>>>,
    permits: Arc<Semaphore>,
    failed: Arc<AtomicBool>,
}

impl<T: Send + 'static> TaskGroup<T> {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = EngineResult<T>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let failed = Arc::clone(&self.failed);
        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| EngineError::Unknown("task group closed".to_owned()))?;
            if failed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let result = unit.await;
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            result.map(Some)
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every unit and returns their outputs, or the first error.
    pub async fn join(mut self) -> EngineResult<Vec<T>> {
        let mut outputs = Vec::with_capacity(self.tasks.len());
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(Some(output))) => outputs.push(output),
                Ok(Ok(None)) => {}
                Ok(Err(error)) => {
                    first_error.get_or_insert(error);
                }
                Err(error) => {
                    tracing::error!(error = %error, "task group unit panicked");
                    first_error.get_or_insert(EngineError::Unknown(error.to_string()));
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(outputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn joins_all_outputs() {
        let mut group = TaskGroup::new(2);
        for value in 0..5 {
            group.spawn(async move { Ok(value) });
        }
        assert_eq!(group.len(), 5);
        let mut outputs = group.join().await.expect("join");
        outputs.sort_unstable();
        assert_eq!(outputs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new(3);
        for _ in 0..12 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            group.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        group.join().await.expect("join");
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn first_error_wins_and_running_siblings_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new(4);
        group.spawn(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Err(EngineError::NotFound)
        });
        for _ in 0..3 {
            let finished = Arc::clone(&finished);
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(group.join().await, Err(EngineError::NotFound));
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }
}
