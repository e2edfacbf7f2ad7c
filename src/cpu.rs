//! Bounded pool for CPU-heavy crypto work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{ServiceError, ServiceResult};
use crate::settings::Settings;

/// Runs closures on the blocking pool, at most `limit` at a time.
#[derive(Clone, Debug)]
pub struct CpuLimiter {
    permits: Arc<Semaphore>,
    queue_timeout: Duration,
}

impl CpuLimiter {
    pub fn new(limit: usize, queue_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
            queue_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.cpu_concurrency_limit(), settings.request_timeout())
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, work: F) -> ServiceResult<T>
    where
        F: FnOnce() -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::time::timeout(self.queue_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| ServiceError::Busy("no CPU worker became free in time".to_string()))?
            .map_err(|_| ServiceError::Internal("CPU limiter closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_work_and_returns_its_result() {
        let cpu = CpuLimiter::new(2, Duration::from_secs(1));
        let value = cpu.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(cpu.available(), 2);
    }

    #[tokio::test]
    async fn saturated_pool_reports_busy() {
        let cpu = CpuLimiter::new(1, Duration::from_millis(50));
        let (release, wait) = std::sync::mpsc::channel::<()>();
        let busy = cpu.clone();
        let holder = tokio::spawn(async move {
            busy.run(move || {
                let _ = wait.recv();
                Ok(())
            })
            .await
        });

        while cpu.available() > 0 {
            tokio::task::yield_now().await;
        }
        let result = cpu.run(|| Ok(())).await;
        assert!(matches!(result, Err(ServiceError::Busy(_))));

        release.send(()).unwrap();
        holder.await.unwrap().unwrap();
    }
}
