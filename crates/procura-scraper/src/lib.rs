//! Procura Scraper - completion-aware extraction from the procurement portal.
//!
//! The portal is a JSF application: every search or page change is a POST to
//! the same endpoint followed by a partial re-render. The
//! [`CompletionEngine`] decides when such an update is complete from the
//! network signal and the rendered table, and the routines in [`regional`]
//! and [`reference`] drive the portal with it. [`ScrapeService`] runs them as
//! background jobs.
//!
//! # Policies
//!
//! - [`ProductionPolicy`] - no bookkeeping
//! - [`DiagnosticPolicy`] - captures network traffic around each action and
//!   writes JSON analyses and HTML dumps
//!
//! # Example
//!
//! ```rust,ignore
//! use procura_browser::BrowserEngine;
//! use procura_core::AppConfig;
//! use procura_scraper::{RegionalQuery, ScrapeService, SiteLayout};
//! use std::sync::Arc;
//!
//! let config = AppConfig::load_with_env()?;
//! let browser = BrowserEngine::launch(&config.browser).await?;
//! let service = ScrapeService::new(config, SiteLayout::default(), Arc::new(browser))?;
//!
//! let job = service.submit_regional(RegionalQuery::new("AREQUIPA", "2025"))?;
//! let status = service.status(&job.id)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod completion;
#[allow(missing_docs)]
pub mod contract;
#[allow(missing_docs)]
pub mod diagnostics;
#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod portal;
#[allow(missing_docs)]
pub mod reference;
#[allow(missing_docs)]
pub mod regional;
pub mod service;
#[allow(missing_docs)]
pub mod site;

// Re-export commonly used types
pub use completion::{
    CompletionEngine, ProductionPolicy, RowScope, ValidatedStructure, WaitPolicy, WaitTimings,
};
pub use contract::{CompletionContract, StructureDescriptor};
pub use diagnostics::{DiagnosticPolicy, NetworkAnalysis};
pub use error::{Result, ScrapeError};
pub use portal::PortalSession;
pub use reference::{ReferenceQuery, ReferenceResult};
pub use regional::{ProcessRecord, RegionalQuery, RegionalResult};
pub use service::{JobOutcome, PageSource, ScrapeService};
pub use site::SiteLayout;
