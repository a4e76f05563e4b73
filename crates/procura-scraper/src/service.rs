//! Extraction service: submits routines as background jobs.
//!
//! This is the surface an HTTP or CLI front end talks to. Each submitted job
//! gets its own page from the [`PageSource`] and releases it when done.

use crate::completion::{CompletionEngine, WaitTimings};
use crate::diagnostics::DiagnosticPolicy;
use crate::error::Result;
use crate::portal::PortalSession;
use crate::reference::{scrape_by_reference, ReferenceQuery};
use crate::regional::{scrape_regional, RegionalQuery};
use crate::site::SiteLayout;
use anyhow::Context;
use procura_browser::{BrowserEngine, PageDriver};
use procura_core::{AppConfig, JobId};
use procura_jobs::{Job, JobError, JobRegistry, JobStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Job kind of regional searches.
pub const KIND_REGIONAL: &str = "regional";
/// Job kind of searches by reference.
pub const KIND_BY_REFERENCE: &str = "by-reference";

/// Hands out one page per job.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Open a fresh page for one job.
    async fn open_page(&self) -> procura_browser::Result<Box<dyn PageDriver>>;
}

#[async_trait::async_trait]
impl PageSource for BrowserEngine {
    async fn open_page(&self) -> procura_browser::Result<Box<dyn PageDriver>> {
        Ok(Box::new(self.new_page().await?))
    }
}

/// Result view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobOutcome {
    /// Still queued or running
    Pending {
        /// `Pending` or `Running`
        status: JobStatus,
    },
    /// Finished with a value
    Succeeded {
        /// Serialized routine result
        result: serde_json::Value,
    },
    /// Finished with an error
    Failed {
        /// Error message with its causes
        error: String,
    },
    /// Cancelled before finishing
    Cancelled,
}

impl From<&Job> for JobOutcome {
    fn from(job: &Job) -> Self {
        match job.status {
            JobStatus::Succeeded => Self::Succeeded {
                result: job.result.clone().unwrap_or_default(),
            },
            JobStatus::Failed => Self::Failed {
                error: job.error.clone().unwrap_or_default(),
            },
            JobStatus::Cancelled => Self::Cancelled,
            status => Self::Pending { status },
        }
    }
}

/// Registry, page source and configuration bundled for job submission.
#[derive(Clone)]
pub struct ScrapeService {
    registry: JobRegistry,
    pages: Arc<dyn PageSource>,
    config: Arc<AppConfig>,
    layout: Arc<SiteLayout>,
    engine: CompletionEngine,
}

impl ScrapeService {
    /// Build a service. The completion policy follows `config.diagnostics`.
    pub fn new(config: AppConfig, layout: SiteLayout, pages: Arc<dyn PageSource>) -> Result<Self> {
        layout.validate()?;
        let engine = Self::engine_for(&config);
        tracing::info!("Scrape service ready ({} policy)", engine.policy().name());

        Ok(Self {
            registry: JobRegistry::new(),
            pages,
            config: Arc::new(config),
            layout: Arc::new(layout),
            engine,
        })
    }

    fn engine_for(config: &AppConfig) -> CompletionEngine {
        let timings = WaitTimings::from(&config.waits);
        if config.diagnostics.enabled {
            let policy = DiagnosticPolicy::from_config(
                &config.diagnostics,
                Duration::from_millis(config.waits.capture_grace_ms),
            );
            CompletionEngine::new(Arc::new(policy), timings)
        } else {
            CompletionEngine::production(timings)
        }
    }

    /// Registry holding this service's jobs.
    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Engine shared by all jobs.
    #[must_use]
    pub fn engine(&self) -> &CompletionEngine {
        &self.engine
    }

    /// Submit a regional search.
    pub fn submit_regional(&self, query: RegionalQuery) -> Result<Job> {
        query.validate()?;
        let metadata = BTreeMap::from([
            ("department".to_string(), query.department.clone()),
            ("year".to_string(), query.year.clone()),
        ]);

        let (pages, config, layout, engine) = self.job_parts();
        Ok(self.registry.create_job(KIND_REGIONAL, metadata, move |ctx| async move {
            let page = pages.open_page().await.context("could not open a browser page")?;
            let session = PortalSession::new(page.as_ref(), &layout, &engine, &config);
            let outcome = scrape_regional(&session, &ctx, &query).await;
            release(page.as_ref()).await;

            let result = outcome.with_context(|| {
                format!("regional search {} {} failed", query.department, query.year)
            })?;
            Ok(serde_json::to_value(result)?)
        }))
    }

    /// Submit a search by process reference.
    pub fn submit_by_reference(&self, query: ReferenceQuery) -> Result<Job> {
        query.validate()?;
        let metadata = BTreeMap::from([("reference".to_string(), query.reference.clone())]);

        let (pages, config, layout, engine) = self.job_parts();
        Ok(self.registry.create_job(KIND_BY_REFERENCE, metadata, move |ctx| async move {
            let page = pages.open_page().await.context("could not open a browser page")?;
            let session = PortalSession::new(page.as_ref(), &layout, &engine, &config);
            let outcome = scrape_by_reference(&session, &ctx, &query).await;
            release(page.as_ref()).await;

            let result =
                outcome.with_context(|| format!("reference search {} failed", query.reference))?;
            Ok(serde_json::to_value(result)?)
        }))
    }

    /// Current record of a job.
    pub fn status(&self, id: &JobId) -> std::result::Result<Job, JobError> {
        self.registry
            .get(id)
            .ok_or_else(|| JobError::UnknownJob(id.clone()))
    }

    /// Result or error of a job.
    pub fn result(&self, id: &JobId) -> std::result::Result<JobOutcome, JobError> {
        self.status(id).map(|job| JobOutcome::from(&job))
    }

    /// Request cancellation and return the updated record.
    ///
    /// Cancelling a finished job is not an error; its record is returned
    /// unchanged.
    pub fn cancel(&self, id: &JobId) -> std::result::Result<Job, JobError> {
        if !self.registry.cancel(id) {
            tracing::debug!(job_id = %id, "Cancel ignored");
        }
        self.status(id)
    }

    /// All jobs in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Job> {
        self.registry.list()
    }

    fn job_parts(
        &self,
    ) -> (
        Arc<dyn PageSource>,
        Arc<AppConfig>,
        Arc<SiteLayout>,
        CompletionEngine,
    ) {
        (
            self.pages.clone(),
            self.config.clone(),
            self.layout.clone(),
            self.engine.clone(),
        )
    }
}

async fn release(page: &dyn PageDriver) {
    if let Err(e) = page.close().await {
        tracing::warn!("Could not close page: {}", e);
    }
}
