use crate::actions::{parse_target_url, PageDriver};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use crate::locator::{js_string, Locator};
use crate::network::{Exchange, NetworkTap};
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::stream::StreamExt;
use procura_core::BrowserConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Headless Chromium instance shared by all pages of a process.
pub struct BrowserEngine {
    browser: Browser,
    handler: JoinHandle<()>,
    fingerprint: FingerprintConfig,
    page_load_timeout: Duration,
}

impl BrowserEngine {
    /// Launch Chromium with the given settings and a randomized fingerprint.
    pub async fn launch(settings: &BrowserConfig) -> Result<Self> {
        let fingerprint =
            FingerprintConfig::randomized(settings.window_width, settings.window_height);
        Self::with_fingerprint(settings, fingerprint).await
    }

    /// Launch Chromium presenting a specific fingerprint.
    pub async fn with_fingerprint(
        settings: &BrowserConfig,
        fingerprint: FingerprintConfig,
    ) -> Result<Self> {
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .args(fingerprint.launch_args());
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
        });

        tracing::info!(
            "Browser launched (headless: {}, viewport {}x{})",
            settings.headless,
            fingerprint.viewport_width,
            fingerprint.viewport_height
        );

        Ok(Self {
            browser,
            handler,
            fingerprint,
            page_load_timeout: settings.page_load_timeout(),
        })
    }

    /// Fingerprint this browser presents.
    pub fn fingerprint(&self) -> &FingerprintConfig {
        &self.fingerprint
    }

    /// Open a blank page with its network tap already listening.
    pub async fn new_page(&self) -> Result<ChromiumPage> {
        let page = self.browser.new_page("about:blank").await?;
        page.execute(EnableParams::default()).await?;
        ChromiumPage::attach(page, self.page_load_timeout).await
    }

    /// Close the browser and stop the event handler.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        tracing::info!("Browser closed");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Lookup<T> {
    found: bool,
    value: Option<T>,
}

/// Upper bound on requests awaiting a response or failure.
const MAX_PENDING_REQUESTS: usize = 4096;

/// Request methods keyed by CDP request id until the request settles.
///
/// Responses don't carry the method, so it is remembered from the request.
/// Entries leave on response or on loading failure; the map is cleared if it
/// ever reaches [`MAX_PENDING_REQUESTS`].
#[derive(Debug, Default)]
struct PendingMethods {
    methods: HashMap<String, String>,
}

impl PendingMethods {
    fn insert(&mut self, request_id: &str, method: &str) {
        if self.methods.len() >= MAX_PENDING_REQUESTS && !self.methods.contains_key(request_id) {
            tracing::debug!("Dropping {} unsettled request ids", self.methods.len());
            self.methods.clear();
        }
        self.methods.insert(request_id.to_string(), method.to_string());
    }

    fn take(&mut self, request_id: &str) -> Option<String> {
        self.methods.remove(request_id)
    }

    fn len(&self) -> usize {
        self.methods.len()
    }
}

/// A Chromium tab driven through CDP.
pub struct ChromiumPage {
    page: Page,
    tap: Arc<NetworkTap>,
    listener: JoinHandle<()>,
    page_load_timeout: Duration,
}

impl ChromiumPage {
    async fn attach(page: Page, page_load_timeout: Duration) -> Result<Self> {
        let tap = Arc::new(NetworkTap::new());
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let mut failures = page.event_listener::<EventLoadingFailed>().await?;

        let sink = tap.clone();
        let listener = tokio::spawn(async move {
            let mut methods = PendingMethods::default();
            loop {
                tokio::select! {
                    Some(event) = requests.next() => {
                        let method = &event.request.method;
                        methods.insert(event.request_id.inner(), method);
                        let resource_type = event.r#type.as_ref().map(|t| format!("{t:?}").to_lowercase());
                        sink.publish(Exchange::request(method, &event.request.url, resource_type.as_deref()));
                    }
                    Some(event) = failures.next() => {
                        let method = methods.take(event.request_id.inner());
                        tracing::trace!(
                            "Request {} ({}) failed: {} ({} pending)",
                            event.request_id.inner(),
                            method.as_deref().unwrap_or("?"),
                            event.error_text,
                            methods.len()
                        );
                    }
                    Some(event) = responses.next() => {
                        let method = methods.take(event.request_id.inner());
                        let status = u16::try_from(event.response.status).unwrap_or_default();
                        let exchange = Exchange::response(method.as_deref(), &event.response.url, status)
                            .with_resource_type(&format!("{:?}", event.r#type).to_lowercase())
                            .with_content_type(&event.response.mime_type);
                        sink.publish(exchange);
                    }
                    else => break,
                }
            }
        });

        Ok(Self {
            page,
            tap,
            listener,
            page_load_timeout,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<T>()
            .map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn on_first<T: DeserializeOwned>(&self, target: &Locator, body: &str) -> Result<T> {
        let script = format!(
            "(() => {{ const el = {}[0]; if (!el) return {{ found: false }}; {body} }})()",
            target.resolver_script()
        );
        let lookup: Lookup<T> = self.eval(script).await?;
        match (lookup.found, lookup.value) {
            (true, Some(value)) => Ok(value),
            (true, None) => Err(BrowserError::Evaluation(format!(
                "no value returned for {target}"
            ))),
            (false, _) => Err(BrowserError::SelectorNotFound(target.to_string())),
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait::async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let target = parse_target_url(url)?;
        tracing::debug!("Navigating to {}", target);

        let load = async {
            self.page.goto(target.as_str()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, BrowserError>(())
        };
        tokio::time::timeout(self.page_load_timeout, load)
            .await
            .map_err(|_| {
                BrowserError::Timeout(format!(
                    "page load exceeded {}ms",
                    self.page_load_timeout.as_millis()
                ))
            })?
    }

    async fn count(&self, target: &Locator) -> Result<usize> {
        self.eval(format!("{}.length", target.resolver_script()))
            .await
    }

    async fn is_visible(&self, target: &Locator) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = {}[0]; if (!el) return false; const s = getComputedStyle(el); const r = el.getBoundingClientRect(); return s.visibility !== 'hidden' && s.display !== 'none' && (r.width > 0 || r.height > 0); }})()",
            target.resolver_script()
        );
        self.eval(script).await
    }

    async fn inner_text(&self, target: &Locator) -> Result<String> {
        self.on_first(
            target,
            "return { found: true, value: el.innerText ?? el.textContent ?? '' };",
        )
        .await
    }

    async fn attribute(&self, target: &Locator, name: &str) -> Result<Option<String>> {
        let body = format!(
            "return {{ found: true, value: {{ attr: el.getAttribute({}) }} }};",
            js_string(name)
        );

        #[derive(Deserialize)]
        struct Attr {
            #[serde(default)]
            attr: Option<String>,
        }

        let attr: Attr = self.on_first(target, &body).await?;
        Ok(attr.attr)
    }

    async fn click(&self, target: &Locator) -> Result<()> {
        let clicked: bool = self
            .on_first(
                target,
                "el.scrollIntoView({ block: 'center' }); el.click(); return { found: true, value: true };",
            )
            .await?;
        tracing::trace!("Clicked {} ({})", target, clicked);
        Ok(())
    }

    async fn fill(&self, target: &Locator, value: &str) -> Result<()> {
        let body = format!(
            "el.focus(); el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); el.dispatchEvent(new Event('change', {{ bubbles: true }})); return {{ found: true, value: true }};",
            js_string(value)
        );
        let _: bool = self.on_first(target, &body).await?;
        Ok(())
    }

    async fn outer_html(&self, target: &Locator) -> Result<String> {
        self.on_first(target, "return { found: true, value: el.outerHTML };")
            .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    fn network(&self) -> &NetworkTap {
        &self.tap
    }

    async fn close(&self) -> Result<()> {
        self.listener.abort();
        self.page.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_without_value() {
        let lookup: Lookup<String> = serde_json::from_str(r#"{"found": false}"#).unwrap();
        assert!(!lookup.found);
        assert!(lookup.value.is_none());

        let lookup: Lookup<bool> = serde_json::from_str(r#"{"found": true, "value": true}"#).unwrap();
        assert_eq!(lookup.value, Some(true));
    }

    #[test]
    fn test_pending_methods_settle() {
        let mut pending = PendingMethods::default();
        pending.insert("1", "POST");
        pending.insert("2", "GET");

        assert_eq!(pending.take("1").as_deref(), Some("POST"));
        assert_eq!(pending.take("1"), None);
        // A failed request leaves the map the same way.
        assert_eq!(pending.take("2").as_deref(), Some("GET"));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_pending_methods_are_bounded() {
        let mut pending = PendingMethods::default();
        for id in 0..MAX_PENDING_REQUESTS {
            pending.insert(&id.to_string(), "GET");
        }
        assert_eq!(pending.len(), MAX_PENDING_REQUESTS);

        // Re-sending a known id does not trigger the purge.
        pending.insert("0", "POST");
        assert_eq!(pending.len(), MAX_PENDING_REQUESTS);

        pending.insert("overflow", "POST");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take("overflow").as_deref(), Some("POST"));
    }
}
