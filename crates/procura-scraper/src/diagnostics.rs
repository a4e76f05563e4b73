//! Diagnostic wait policy.
//!
//! Records every network exchange around a triggering action, summarizes
//! the difference in the log and writes it as JSON next to HTML dumps and
//! screenshots of the panels the routines interact with.

use crate::completion::WaitPolicy;
use crate::contract::CompletionContract;
use chrono::{DateTime, Utc};
use procura_browser::{Exchange, ExchangePhase, Locator, NetworkTap, PageDriver, SignalSnapshot};
use procura_core::{DiagnosticsConfig, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Condensed view of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub method: Option<String>,
    pub url: String,
    pub status: Option<u16>,
    pub resource_type: Option<String>,
}

impl From<&Exchange> for ExchangeSummary {
    fn from(exchange: &Exchange) -> Self {
        Self {
            method: exchange.method.clone(),
            url: exchange.url.clone(),
            status: exchange.status,
            resource_type: exchange.resource_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCounts {
    pub new_requests: usize,
    pub new_responses: usize,
    pub ajax_requests: usize,
    pub static_assets: usize,
}

/// What changed in the network log while a capture window was open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    pub label: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub counts: AnalysisCounts,
    /// XHR/fetch or POST requests, in order
    pub ajax_requests: Vec<ExchangeSummary>,
    /// Responses to everything that is not a static asset
    pub responses: Vec<ExchangeSummary>,
    /// Static asset URLs, listed only when requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_assets: Vec<String>,
}

impl NetworkAnalysis {
    /// Diff two snapshots of the same tap.
    #[must_use]
    pub fn between(
        label: &str,
        before: &SignalSnapshot,
        after: &SignalSnapshot,
        include_static: bool,
    ) -> Self {
        let new = after.since(before);
        let (assets, calls): (Vec<&Exchange>, Vec<&Exchange>) =
            new.iter().partition(|e| e.is_static_asset());

        let ajax_requests: Vec<ExchangeSummary> = calls
            .iter()
            .filter(|e| e.phase == ExchangePhase::Request && e.is_ajax_like())
            .map(|e| ExchangeSummary::from(*e))
            .collect();
        let responses: Vec<ExchangeSummary> = calls
            .iter()
            .filter(|e| e.phase == ExchangePhase::Response)
            .map(|e| ExchangeSummary::from(*e))
            .collect();

        let asset_requests: Vec<&Exchange> = assets
            .into_iter()
            .filter(|e| e.phase == ExchangePhase::Request)
            .collect();

        Self {
            label: label.to_string(),
            window_start: before.taken_at,
            window_end: after.taken_at,
            counts: AnalysisCounts {
                new_requests: new
                    .iter()
                    .filter(|e| e.phase == ExchangePhase::Request)
                    .count(),
                new_responses: new
                    .iter()
                    .filter(|e| e.phase == ExchangePhase::Response)
                    .count(),
                ajax_requests: ajax_requests.len(),
                static_assets: asset_requests.len(),
            },
            ajax_requests,
            responses,
            static_assets: if include_static {
                asset_requests.iter().map(|e| e.url.clone()).collect()
            } else {
                Vec::new()
            },
        }
    }

    fn log_summary(&self) {
        tracing::info!(
            "Network analysis [{}]: {} new requests, {} new responses, {} AJAX",
            self.label,
            self.counts.new_requests,
            self.counts.new_responses,
            self.counts.ajax_requests
        );
        for call in &self.ajax_requests {
            tracing::info!(
                "  {} {}",
                call.method.as_deref().unwrap_or("?"),
                call.url
            );
        }
    }
}

/// Policy that captures network traffic and dumps HTML for later inspection.
#[derive(Debug, Clone)]
pub struct DiagnosticPolicy {
    output_dir: PathBuf,
    include_static: bool,
    capture_grace: Duration,
}

impl DiagnosticPolicy {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, include_static: bool, capture_grace: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            include_static,
            capture_grace,
        }
    }

    #[must_use]
    pub fn from_config(config: &DiagnosticsConfig, capture_grace: Duration) -> Self {
        Self::new(config.output_dir.clone(), config.include_static, capture_grace)
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write(&self, file_name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}

#[async_trait::async_trait]
impl WaitPolicy for DiagnosticPolicy {
    fn name(&self) -> &'static str {
        "diagnostic"
    }

    fn open_capture(&self, tap: &NetworkTap) -> Option<SignalSnapshot> {
        tap.attach();
        let before = tap.snapshot();
        tracing::info!("Capture opened with {} recorded exchanges", before.len());
        Some(before)
    }

    async fn close_capture(
        &self,
        tap: &NetworkTap,
        opened: Option<SignalSnapshot>,
        contract: &CompletionContract,
    ) {
        let Some(before) = opened else {
            return;
        };

        // Late responses still belong to this action.
        tokio::time::sleep(self.capture_grace).await;
        let after = tap.snapshot();

        let analysis = NetworkAnalysis::between(&contract.label, &before, &after, self.include_static);
        analysis.log_summary();

        let file_name = format!(
            "network_analysis_{}_{}.json",
            contract.label,
            Timestamp::now().file_stamp()
        );
        let json = match serde_json::to_vec_pretty(&analysis) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Could not serialize network analysis: {}", e);
                return;
            }
        };
        match self.write(&file_name, &json).await {
            Ok(path) => tracing::debug!("Network analysis saved to {}", path.display()),
            Err(e) => tracing::warn!("Could not save network analysis: {}", e),
        }
    }

    async fn record_artifact(&self, page: &dyn PageDriver, target: &Locator, name: &str) {
        let html = match page.outer_html(target).await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!("No HTML dump for {}: {}", target, e);
                return;
            }
        };
        match self.write(&format!("{name}.html"), html.as_bytes()).await {
            Ok(path) => tracing::debug!("HTML saved to {}", path.display()),
            Err(e) => tracing::warn!("Could not save HTML dump {}: {}", name, e),
        }

        match page.screenshot().await {
            Ok(png) => match self.write(&format!("{name}.png"), &png).await {
                Ok(path) => tracing::debug!("Screenshot saved to {}", path.display()),
                Err(e) => tracing::warn!("Could not save screenshot {}: {}", name, e),
            },
            Err(e) => tracing::debug!("No screenshot for {}: {}", name, e),
        }
    }
}
