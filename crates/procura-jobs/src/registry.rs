//! Job registry and background runner.
//!
//! The registry owns every job record created in this process. All state
//! changes go through one mutex that is held only for the map access, never
//! across a job body's execution.

use crate::context::JobContext;
use crate::error::Cancelled;
use crate::job::{Job, JobStatus};
use futures::FutureExt;
use procura_core::JobId;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

struct JobEntry {
    job: Job,
    token: CancellationToken,
}

#[derive(Default)]
struct Jobs {
    entries: HashMap<JobId, JobEntry>,
    order: Vec<JobId>,
}

/// How a job body ended.
enum Outcome {
    Succeeded(serde_json::Value),
    Failed(String),
    Cancelled,
}

/// Shared registry of background jobs.
///
/// Cloning is cheap and every clone refers to the same registry.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<Jobs>>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and schedule `body` on the tokio runtime.
    ///
    /// Returns the `Queued` record immediately. Must be called from within a
    /// tokio runtime.
    pub fn create_job<F, Fut>(&self, kind: &str, metadata: BTreeMap<String, String>, body: F) -> Job
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let id = JobId::generate();
        let token = CancellationToken::new();
        let job = Job::queued(id.clone(), kind, metadata);

        {
            let mut jobs = self.lock();
            jobs.entries.insert(
                id.clone(),
                JobEntry {
                    job: job.clone(),
                    token: token.clone(),
                },
            );
            jobs.order.push(id.clone());
        }

        tracing::info!(job_id = %id, kind, "Job created");

        let registry = self.clone();
        let ctx = JobContext::new(id, token);
        tokio::spawn(async move {
            registry.run(ctx, body).await;
        });

        job
    }

    /// Snapshot of a job.
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.lock().entries.get(id).map(|entry| entry.job.clone())
    }

    /// Request cancellation.
    ///
    /// Returns `false` when the job is unknown or already terminal. The record
    /// is marked `Cancelled` right away; the body stops at its next checkpoint.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut jobs = self.lock();
        let Some(entry) = jobs.entries.get_mut(id) else {
            return false;
        };

        if !entry.job.transition(JobStatus::Cancelled) {
            return false;
        }
        entry.token.cancel();
        drop(jobs);

        tracing::info!(job_id = %id, "Job cancelled");
        true
    }

    /// Snapshots of all jobs in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Job> {
        let jobs = self.lock();
        jobs.order
            .iter()
            .filter_map(|id| jobs.entries.get(id))
            .map(|entry| entry.job.clone())
            .collect()
    }

    /// Number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when no job was ever created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn run<F, Fut>(self, ctx: JobContext, body: F)
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let id = ctx.job_id().clone();

        if !self.update(&id, |job| job.transition(JobStatus::Running)) {
            tracing::debug!(job_id = %id, "Job cancelled before start, body skipped");
            return;
        }
        tracing::debug!(job_id = %id, "Job running");

        let body_ctx = ctx.clone();
        let outcome = AssertUnwindSafe(async move { body(body_ctx).await })
            .catch_unwind()
            .await;

        let outcome = match outcome {
            Ok(Ok(value)) => Outcome::Succeeded(value),
            Ok(Err(e)) if is_cancellation(&e) || ctx.is_cancelled() => Outcome::Cancelled,
            Ok(Err(e)) => Outcome::Failed(format!("{e:#}")),
            Err(panic) => Outcome::Failed(format!("task panicked: {}", panic_message(&*panic))),
        };

        self.finish(&id, outcome);
    }

    fn finish(&self, id: &JobId, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded(value) => {
                if self.update(id, |job| job.succeed(value)) {
                    tracing::info!(job_id = %id, "Job succeeded");
                }
            }
            Outcome::Failed(message) => {
                tracing::error!(job_id = %id, "Job failed: {}", message);
                self.update(id, |job| job.fail(message));
            }
            Outcome::Cancelled => {
                // Already marked by `cancel`; this covers bodies that bailed
                // out with `Cancelled` on their own.
                if self.update(id, |job| job.transition(JobStatus::Cancelled)) {
                    tracing::info!(job_id = %id, "Job cancelled by its body");
                } else {
                    tracing::debug!(job_id = %id, "Job body stopped after cancellation");
                }
            }
        }
    }

    fn update(&self, id: &JobId, apply: impl FnOnce(&mut Job) -> bool) -> bool {
        self.lock()
            .entries
            .get_mut(id)
            .is_some_and(|entry| apply(&mut entry.job))
    }

    fn lock(&self) -> MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.is::<Cancelled>() || err.chain().any(|cause| cause.is::<Cancelled>())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
