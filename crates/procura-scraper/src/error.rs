use procura_browser::BrowserError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Results container not found: {0}")]
    ContainerMissing(String),

    #[error("Table has {found} columns, expected at least {expected}")]
    StructureMismatch { found: usize, expected: usize },

    #[error("No rows under {0} after waiting")]
    EmptyAfterWait(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid site layout: {0}")]
    Layout(String),

    #[error("Extraction cancelled")]
    Cancelled(#[from] procura_jobs::Cancelled),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
