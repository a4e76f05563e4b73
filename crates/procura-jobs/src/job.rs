//! Job record and lifecycle states.

use chrono::{DateTime, Utc};
use procura_core::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, body not started yet
    Queued,
    /// Body is executing
    Running,
    /// Body returned a value
    Succeeded,
    /// Body returned an error or panicked
    Failed,
    /// Cancellation was requested
    Cancelled,
}

impl JobStatus {
    /// Terminal states never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_become(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running | Self::Cancelled) => true,
            (Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Snapshot of a background job.
///
/// Callers only ever see copies; the registry owns the live record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,
    /// Caller-supplied category, e.g. `regional`
    pub kind: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Body output, present only when `Succeeded`
    pub result: Option<serde_json::Value>,
    /// Rendered error, present only when `Failed`
    pub error: Option<String>,
    /// Caller annotations, never interpreted
    pub metadata: BTreeMap<String, String>,
}

impl Job {
    pub(crate) fn queued(id: JobId, kind: &str, metadata: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: kind.to_string(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            metadata,
        }
    }

    /// Apply a transition. Illegal transitions are ignored and reported as `false`.
    pub(crate) fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_become(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub(crate) fn succeed(&mut self, value: serde_json::Value) -> bool {
        let moved = self.transition(JobStatus::Succeeded);
        if moved {
            self.result = Some(value);
        }
        moved
    }

    pub(crate) fn fail(&mut self, message: String) -> bool {
        let moved = self.transition(JobStatus::Failed);
        if moved {
            self.error = Some(message);
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued() -> Job {
        Job::queued(JobId::generate(), "regional", BTreeMap::new())
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = queued();
        assert!(job.transition(JobStatus::Running));
        assert!(job.succeed(serde_json::json!({"value": 42})));
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = queued();
        job.transition(JobStatus::Running);
        job.fail("boom".to_string());

        assert!(!job.transition(JobStatus::Cancelled));
        assert!(!job.succeed(serde_json::json!(1)));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_queued_cannot_finish_without_running() {
        let mut job = queued();
        assert!(!job.succeed(serde_json::json!(null)));
        assert!(!job.fail("x".to_string()));
        assert!(job.transition(JobStatus::Cancelled));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(JobStatus::Running.to_string(), "running");
    }
}
