//! Procura Core - Foundation crate for the Procura extraction workspace.
//!
//! This crate provides shared types, error handling, configuration management
//! and logging setup that all other Procura crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`JobId`, `Timestamp`)
//! - [`logging`] - `tracing-subscriber` initialization
//!
//! # Example
//!
//! ```rust
//! use procura_core::{AppConfig, JobId};
//!
//! let config = AppConfig::default();
//! assert!(config.validate().is_ok());
//!
//! let id = JobId::generate();
//! assert!(!id.as_str().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, DiagnosticsConfig, LoggingConfig, PacingConfig, SiteConfig,
    WaitConfig,
};
pub use error::{ConfigError, ConfigResult, ProcuraError, Result};
pub use logging::init_tracing;
pub use types::{JobId, Timestamp};
