//! Bounded per-stage fan-out

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Spawns one task per unit of work with at most `max_in_flight` running.
///
/// [`spawn`](Self::spawn) waits for a permit, so a saturated stage stops
/// pulling from its input channel.
pub struct FanOut {
    stage: &'static str,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl FanOut {
    pub fn new(stage: &'static str, max_in_flight: usize) -> Self {
        Self {
            stage,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
        }
    }

    pub async fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(stage = self.stage, error = %e, "worker pool closed");
                return;
            }
        };

        self.tasks.spawn(async move {
            work.await;
            drop(permit);
        });

        // Reap finished workers so the set stays bounded too
        while let Some(result) = self.tasks.try_join_next() {
            self.log_failure(result);
        }
    }

    /// Wait for every spawned worker
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            self.log_failure(result);
        }
    }

    fn log_failure(&self, result: Result<(), tokio::task::JoinError>) {
        if let Err(e) = result {
            tracing::error!(stage = self.stage, error = %e, "worker task failed");
        }
    }
}
