use crate::error::Cancelled;
use procura_core::JobId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Handle a job body uses to cooperate with cancellation.
#[derive(Debug, Clone)]
pub struct JobContext {
    id: JobId,
    token: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(id: JobId, token: CancellationToken) -> Self {
        Self { id, token }
    }

    /// Context not tied to any registry, for running a body directly
    /// (one-off CLI runs, tests). Cancel it through [`JobContext::token`].
    #[must_use]
    pub fn detached() -> Self {
        Self::new(JobId::generate(), CancellationToken::new())
    }

    /// Id of the job this body runs for.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.id
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Return `Err(Cancelled)` once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            tracing::debug!(job_id = %self.id, "Cancellation observed at checkpoint");
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep that ends early with `Err(Cancelled)` when the job is cancelled.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            () = self.token.cancelled() => Err(Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Token for handing to code that wants to select on cancellation itself.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_is_interrupted() {
        let token = CancellationToken::new();
        let ctx = JobContext::new(JobId::generate(), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        assert_eq!(ctx.sleep(Duration::from_secs(10)).await, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        canceller.await.unwrap();
    }

    #[test]
    fn test_detached_context_can_be_cancelled() {
        let ctx = JobContext::detached();
        assert!(ctx.checkpoint().is_ok());
        ctx.token().cancel();
        assert_eq!(ctx.checkpoint(), Err(Cancelled));
    }

    #[test]
    fn test_checkpoint() {
        let token = CancellationToken::new();
        let ctx = JobContext::new(JobId::generate(), token.clone());
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.checkpoint(), Err(Cancelled));
    }
}
