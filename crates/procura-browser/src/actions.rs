use crate::error::{BrowserError, Result};
use crate::locator::Locator;
use crate::network::NetworkTap;
use std::time::Duration;

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// Page-level operations the extraction routines rely on.
///
/// Every method resolves its [`Locator`] afresh, so callers never hold
/// stale element handles across partial page updates.
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the load to finish
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Number of elements the locator currently matches
    async fn count(&self, target: &Locator) -> Result<usize>;

    /// Whether the first match is rendered and visible
    async fn is_visible(&self, target: &Locator) -> Result<bool>;

    /// Rendered text of the first match
    async fn inner_text(&self, target: &Locator) -> Result<String>;

    /// Attribute of the first match, `None` when the attribute is absent
    async fn attribute(&self, target: &Locator, name: &str) -> Result<Option<String>>;

    /// Click the first match
    async fn click(&self, target: &Locator) -> Result<()>;

    /// Replace the value of the first matching input
    async fn fill(&self, target: &Locator, value: &str) -> Result<()>;

    /// Outer HTML of the first match
    async fn outer_html(&self, target: &Locator) -> Result<String>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Network events observed on this page
    fn network(&self) -> &NetworkTap;

    /// Release the page. Drivers without a remote resource keep the default.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Poll until the locator has a visible match.
    async fn wait_visible(&self, target: &Locator, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_visible(target).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "{target} not visible after {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }
}

/// Parse a navigation target, rejecting anything that is not http(s).
pub fn parse_target_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        "http" | "https" => Err(BrowserError::NavigationError(
            "No host in URL".to_string(),
        )),
        other => Err(BrowserError::NavigationError(format!(
            "Unsupported scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_url() {
        let url = parse_target_url(
            "https://prod2.seace.gob.pe/seacebus-uiwd-pub/buscadorPublico/buscadorPublico.xhtml",
        )
        .unwrap();
        assert_eq!(url.host_str(), Some("prod2.seace.gob.pe"));
    }

    #[test]
    fn test_parse_target_url_invalid() {
        assert!(parse_target_url("not-a-url").is_err());
        assert!(parse_target_url("file:///etc/passwd").is_err());
    }
}
