use procura_core::JobId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("job cancelled")]
    Cancelled(#[from] Cancelled),
}

/// Marker error a job body returns when it observed its cancellation token.
///
/// The runner recognizes it anywhere in an `anyhow` chain and records the
/// job as `Cancelled` instead of `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled at checkpoint")]
pub struct Cancelled;
