//! Background job orchestration.
//!
//! [`JobRegistry`] runs job bodies on the tokio runtime, tracks their
//! lifecycle (`Queued → Running → Succeeded | Failed | Cancelled`) and
//! exposes cooperative cancellation through [`JobContext`].
//!
//! ```rust
//! use procura_jobs::{JobRegistry, JobStatus};
//! use std::collections::BTreeMap;
//!
//! # tokio_test::block_on(async {
//! let registry = JobRegistry::new();
//! let job = registry.create_job("demo", BTreeMap::new(), |_ctx| async {
//!     Ok(serde_json::json!({ "value": 42 }))
//! });
//! assert_eq!(job.status, JobStatus::Queued);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod context;
#[allow(missing_docs)]
pub mod error;
pub mod job;
pub mod registry;

pub use context::JobContext;
pub use error::{Cancelled, JobError, Result};
pub use job::{Job, JobStatus};
pub use registry::JobRegistry;
