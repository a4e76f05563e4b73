//! Network signal tap.
//!
//! Every request and response observed on a page is published as an
//! [`Exchange`]. Consumers either arm a one-shot [`ExchangeWatch`] for a
//! specific call, wait for the network to go quiet, or attach the
//! append-only log and diff two [`SignalSnapshot`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

const CHANNEL_CAPACITY: usize = 1024;

const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".map",
];

/// Which side of an exchange was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangePhase {
    /// Request about to be sent
    Request,
    /// Response headers received
    Response,
}

/// One observed network event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Request or response
    pub phase: ExchangePhase,
    /// Full request URL
    pub url: String,
    /// HTTP method, when known
    pub method: Option<String>,
    /// HTTP status (responses only)
    pub status: Option<u16>,
    /// Browser resource type (`xhr`, `fetch`, `document`, ...)
    pub resource_type: Option<String>,
    /// Response content type
    pub content_type: Option<String>,
    /// When the tap saw the event
    pub observed_at: DateTime<Utc>,
}

impl Exchange {
    /// A request event.
    #[must_use]
    pub fn request(method: &str, url: &str, resource_type: Option<&str>) -> Self {
        Self {
            phase: ExchangePhase::Request,
            url: url.to_string(),
            method: Some(method.to_string()),
            status: None,
            resource_type: resource_type.map(str::to_string),
            content_type: None,
            observed_at: Utc::now(),
        }
    }

    /// A response event.
    #[must_use]
    pub fn response(method: Option<&str>, url: &str, status: u16) -> Self {
        Self {
            phase: ExchangePhase::Response,
            url: url.to_string(),
            method: method.map(str::to_string),
            status: Some(status),
            resource_type: None,
            content_type: None,
            observed_at: Utc::now(),
        }
    }

    /// Set the resource type.
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Whether the URL looks like a stylesheet, script, image or font.
    #[must_use]
    pub fn is_static_asset(&self) -> bool {
        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Whether this is an XHR/fetch call or a POST (JSF partial submits
    /// are not always tagged as XHR).
    #[must_use]
    pub fn is_ajax_like(&self) -> bool {
        let ajax_type = matches!(self.resource_type.as_deref(), Some("xhr" | "fetch"));
        let post = self
            .method
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("POST"));
        ajax_type || post
    }
}

/// Predicate selecting the response that signals an update finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeMatcher {
    /// Substring the response URL must contain
    pub url_fragment: String,
    /// Required request method (case-insensitive)
    #[serde(default)]
    pub method: Option<String>,
    /// Required status code
    #[serde(default)]
    pub status: Option<u16>,
}

impl ExchangeMatcher {
    /// Match any response whose URL contains `url_fragment`.
    #[must_use]
    pub fn new(url_fragment: &str) -> Self {
        Self {
            url_fragment: url_fragment.to_string(),
            method: None,
            status: None,
        }
    }

    /// Also require the request method.
    #[must_use]
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    /// Also require the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Only completed responses can match.
    #[must_use]
    pub fn matches(&self, exchange: &Exchange) -> bool {
        if exchange.phase != ExchangePhase::Response || !exchange.url.contains(&self.url_fragment)
        {
            return false;
        }

        if let Some(method) = &self.method {
            let same = exchange
                .method
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(method));
            if !same {
                return false;
            }
        }

        match self.status {
            Some(status) => exchange.status == Some(status),
            None => true,
        }
    }
}

/// Ordered copy of the exchange log at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// All exchanges recorded since the log was attached
    pub events: Vec<Exchange>,
}

impl SignalSnapshot {
    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Request events.
    pub fn requests(&self) -> impl Iterator<Item = &Exchange> {
        self.events
            .iter()
            .filter(|e| e.phase == ExchangePhase::Request)
    }

    /// Response events.
    pub fn responses(&self) -> impl Iterator<Item = &Exchange> {
        self.events
            .iter()
            .filter(|e| e.phase == ExchangePhase::Response)
    }

    /// Events recorded after `earlier` was taken.
    ///
    /// The log is append-only, so the difference is positional. Repeated
    /// calls to the same URL (every JSF postback hits the same endpoint)
    /// are therefore still reported as new.
    #[must_use]
    pub fn since(&self, earlier: &SignalSnapshot) -> &[Exchange] {
        let start = earlier.events.len().min(self.events.len());
        &self.events[start..]
    }
}

/// Fan-out point for a page's network events.
#[derive(Debug)]
pub struct NetworkTap {
    sender: broadcast::Sender<Exchange>,
    log: Mutex<Vec<Exchange>>,
    attached: AtomicBool,
}

impl NetworkTap {
    /// Create a tap with no subscribers and the log detached.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            log: Mutex::new(Vec::new()),
            attached: AtomicBool::new(false),
        }
    }

    /// Publish an observed exchange to watchers and, when attached, the log.
    pub fn publish(&self, exchange: Exchange) {
        if self.attached.load(Ordering::Acquire) {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(exchange.clone());
        }
        // No receivers is the normal case between waits.
        let _ = self.sender.send(exchange);
    }

    /// Arm a one-shot observation. Only exchanges published after this call
    /// are seen, so it must be called before the triggering action.
    #[must_use]
    pub fn watch(&self, matcher: ExchangeMatcher) -> ExchangeWatch {
        ExchangeWatch {
            receiver: self.sender.subscribe(),
            matcher,
        }
    }

    /// Start recording every exchange. Returns `false` if already attached.
    pub fn attach(&self) -> bool {
        let newly = !self.attached.swap(true, Ordering::AcqRel);
        if newly {
            tracing::info!("Network log attached");
        }
        newly
    }

    /// Whether the log is recording.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Copy of the log so far.
    #[must_use]
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            taken_at: Utc::now(),
            events: self
                .log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Wait until no exchange has been published for `quiet`.
    ///
    /// Returns `false` if `ceiling` elapsed first.
    pub async fn wait_for_idle(&self, quiet: Duration, ceiling: Duration) -> bool {
        let mut receiver = self.sender.subscribe();
        let deadline = Instant::now() + ceiling;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            let window = quiet.min(remaining);
            match tokio::time::timeout(window, receiver.recv()).await {
                Err(_) => return window == quiet,
                Ok(Ok(_) | Err(RecvError::Lagged(_))) => {}
                Ok(Err(RecvError::Closed)) => return true,
            }
        }
    }
}

impl Default for NetworkTap {
    fn default() -> Self {
        Self::new()
    }
}

/// An armed observation created by [`NetworkTap::watch`].
#[derive(Debug)]
pub struct ExchangeWatch {
    receiver: broadcast::Receiver<Exchange>,
    matcher: ExchangeMatcher,
}

impl ExchangeWatch {
    /// The predicate this watch is waiting for.
    #[must_use]
    pub fn matcher(&self) -> &ExchangeMatcher {
        &self.matcher
    }

    /// Wait for the first matching exchange, or `None` after `ceiling`.
    pub async fn wait(mut self, ceiling: Duration) -> Option<Exchange> {
        let deadline = Instant::now() + ceiling;

        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Err(_) | Ok(Err(RecvError::Closed)) => return None,
                Ok(Ok(exchange)) if self.matcher.matches(&exchange) => return Some(exchange),
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!("Exchange watch lagged, {} events skipped", skipped);
                }
            }
        }
    }
}
