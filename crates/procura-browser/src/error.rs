use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Failures of the page driver.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// CDP connection, launch or protocol failure
    #[error("chromium error: {0}")]
    ChromiumError(String),

    /// Rejected URL or failed page load
    #[error("navigation failed: {0}")]
    NavigationError(String),

    /// The locator matched nothing when an element was required
    #[error("no element matches {0}")]
    SelectorNotFound(String),

    /// A bounded wait ran out
    #[error("timed out: {0}")]
    Timeout(String),

    /// The in-page script threw or returned an unexpected shape
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::ChromiumError(err.to_string())
    }
}
