//! Deadline and cancellation bookkeeping for one generation request.

use crate::error::{MeshGenError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Bounds a request in time and lets the caller abort it.
///
/// Every network call runs inside [`JobScope::run`], so a server that never
/// answers still ends in `Timeout` or `Cancelled`.
#[derive(Debug, Clone)]
pub struct JobScope {
    start: Instant,
    timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl JobScope {
    /// Starts the clock now.
    pub fn new(timeout: Duration, cancel: Option<CancellationToken>) -> Self {
        Self {
            start: Instant::now(),
            timeout,
            cancel,
        }
    }

    /// Time since the scope was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    /// Fails with `Cancelled` or `Timeout` if the request must stop.
    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(MeshGenError::Cancelled);
        }
        if self.elapsed() >= self.timeout {
            return Err(MeshGenError::Timeout(self.timeout));
        }
        Ok(())
    }

    /// Runs one stage, racing it against the deadline and the token.
    pub async fn run<F, T>(&self, stage: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let bounded = tokio::time::timeout(self.remaining(), stage);
        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(MeshGenError::Cancelled),
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };
        outcome.map_err(|_| MeshGenError::Timeout(self.timeout))?
    }

    /// Sleeps for `interval`, cut short by cancellation or the deadline.
    pub async fn wait(&self, interval: Duration) -> Result<()> {
        let delay = interval.min(self.remaining());
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(MeshGenError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ok_within_deadline() {
        let scope = JobScope::new(Duration::from_secs(60), None);
        assert!(scope.check().is_ok());
        assert!(scope.remaining() <= Duration::from_secs(60));
    }

    #[test]
    fn test_check_zero_timeout() {
        let scope = JobScope::new(Duration::ZERO, None);
        assert!(matches!(scope.check(), Err(MeshGenError::Timeout(_))));
    }

    #[test]
    fn test_check_cancelled_wins_over_timeout() {
        let token = CancellationToken::new();
        token.cancel();
        let scope = JobScope::new(Duration::ZERO, Some(token));
        assert!(matches!(scope.check(), Err(MeshGenError::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let scope = JobScope::new(Duration::from_secs(60), Some(token.clone()));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = Instant::now();
        let result = scope.wait(Duration::from_secs(30)).await;
        assert!(matches!(result, Err(MeshGenError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let scope = JobScope::new(Duration::from_secs(60), Some(CancellationToken::new()));
        assert_eq!(scope.run(async { Ok(7) }).await.unwrap(), 7);

        let err = scope
            .run(async { Err::<(), _>(MeshGenError::InvalidRequest("bad".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, MeshGenError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_run_bounded_by_deadline() {
        let scope = JobScope::new(Duration::from_millis(50), None);
        let started = Instant::now();
        let err = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MeshGenError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let scope = JobScope::new(Duration::from_secs(60), Some(token.clone()));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MeshGenError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_capped_by_deadline() {
        let scope = JobScope::new(Duration::from_millis(30), None);
        let started = Instant::now();
        scope.wait(Duration::from_secs(30)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(scope.check(), Err(MeshGenError::Timeout(_))));
    }
}
