//! Completion detection for asynchronous UI updates.
//!
//! [`CompletionEngine::resolve`] performs a triggering click and decides when
//! the portal finished reacting to it: first from the network (a matching
//! response), then from the DOM (the expected table structure). Policies hook
//! into the same algorithm to add observation without changing its outcome.

use crate::contract::{CompletionContract, StructureDescriptor};
use crate::error::{Result, ScrapeError};
use procura_browser::{ExchangeWatch, Locator, NetworkTap, PageDriver, SignalSnapshot};
use procura_core::WaitConfig;
use std::sync::Arc;
use std::time::Duration;

/// Hooks a policy can attach to [`CompletionEngine::resolve`].
///
/// Every hook is observational. Failures inside a hook are logged by the
/// policy and never change what `resolve` returns.
#[async_trait::async_trait]
pub trait WaitPolicy: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called right before the triggering action.
    fn open_capture(&self, _tap: &NetworkTap) -> Option<SignalSnapshot> {
        None
    }

    /// Called after structure validation, whether it passed or not.
    async fn close_capture(
        &self,
        _tap: &NetworkTap,
        _opened: Option<SignalSnapshot>,
        _contract: &CompletionContract,
    ) {
    }

    /// Persist the markup of an element, and a view of the page, for later
    /// inspection.
    async fn record_artifact(&self, _page: &dyn PageDriver, _target: &Locator, _name: &str) {}
}

/// Minimal-overhead policy: no capture, no artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductionPolicy;

#[async_trait::async_trait]
impl WaitPolicy for ProductionPolicy {
    fn name(&self) -> &'static str {
        "production"
    }
}

/// Bounded waits used by the engine, taken from [`WaitConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimings {
    /// Silence that counts as "network idle"
    pub idle_quiet: Duration,
    /// Cap for the idle fallback when no matching response arrived
    pub fallback_idle: Duration,
    /// Cap for the idle wait after the response
    pub settle_idle: Duration,
    /// Fixed delay absorbing client-side rendering
    pub settle_delay: Duration,
    /// Delay before re-counting rows of a seemingly empty table
    pub empty_retry_delay: Duration,
}

impl From<&WaitConfig> for WaitTimings {
    fn from(config: &WaitConfig) -> Self {
        Self {
            idle_quiet: Duration::from_millis(config.idle_quiet_ms),
            fallback_idle: Duration::from_millis(config.fallback_idle_ms),
            settle_idle: Duration::from_millis(config.settle_idle_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            empty_retry_delay: Duration::from_millis(config.empty_retry_delay_ms),
        }
    }
}

impl Default for WaitTimings {
    fn default() -> Self {
        Self::from(&WaitConfig::default())
    }
}

/// Where the validated rows were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowScope {
    /// Under the results container
    Container,
    /// Anywhere on the page
    Page,
    /// No rows; the container announced an empty result
    NoResults,
}

/// Outcome of a successful structure validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStructure {
    /// Rows found
    pub rows: usize,
    /// Cells in the first row (0 when empty)
    pub cells: usize,
    /// Locator that yields the rows
    pub rows_locator: Locator,
    /// Which fallback produced the rows
    pub scope: RowScope,
}

impl ValidatedStructure {
    /// True when the portal reported no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Shared `resolve` algorithm parameterized by a [`WaitPolicy`].
#[derive(Clone)]
pub struct CompletionEngine {
    policy: Arc<dyn WaitPolicy>,
    timings: WaitTimings,
}

impl CompletionEngine {
    /// Engine running `policy` with `timings`.
    #[must_use]
    pub fn new(policy: Arc<dyn WaitPolicy>, timings: WaitTimings) -> Self {
        Self { policy, timings }
    }

    /// Engine with [`ProductionPolicy`].
    #[must_use]
    pub fn production(timings: WaitTimings) -> Self {
        Self::new(Arc::new(ProductionPolicy), timings)
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> &dyn WaitPolicy {
        self.policy.as_ref()
    }

    /// Configured waits.
    #[must_use]
    pub fn timings(&self) -> &WaitTimings {
        &self.timings
    }

    /// Click `trigger` and wait until the update it causes is complete.
    ///
    /// A missing network signal is soft: it degrades to an idle wait. Only
    /// the structural checks produce errors, plus any failure of the click.
    pub async fn resolve(
        &self,
        page: &dyn PageDriver,
        trigger: &Locator,
        contract: &CompletionContract,
    ) -> Result<ValidatedStructure> {
        let tap = page.network();
        let opened = self.policy.open_capture(tap);

        // Armed before the click so a fast response cannot slip past.
        let watch = tap.watch(contract.exchange.clone());
        if let Err(e) = page.click(trigger).await {
            self.policy.close_capture(tap, opened, contract).await;
            tracing::warn!("[{}] {} click failed: {}", self.policy.name(), contract.label, e);
            return Err(e.into());
        }
        tracing::debug!("[{}] Clicked {}", self.policy.name(), trigger);

        self.await_signal(tap, watch, contract).await;
        self.settle(tap, contract.timeout).await;

        let outcome = self
            .validate_structure(page, &contract.structure, contract.timeout)
            .await;
        self.policy.close_capture(tap, opened, contract).await;

        match &outcome {
            Ok(structure) => tracing::info!(
                "[{}] {} complete: {} rows, {} columns",
                self.policy.name(),
                contract.label,
                structure.rows,
                structure.cells
            ),
            Err(e) => tracing::warn!("[{}] {} failed: {}", self.policy.name(), contract.label, e),
        }
        outcome
    }

    async fn await_signal(&self, tap: &NetworkTap, watch: ExchangeWatch, contract: &CompletionContract) {
        match watch.wait(contract.timeout).await {
            Some(exchange) => tracing::debug!(
                "Matched {} {} -> {}",
                exchange.method.as_deref().unwrap_or("?"),
                exchange.url,
                exchange.status.unwrap_or_default()
            ),
            None => {
                tracing::warn!(
                    "No response matching '{}' within {}ms, falling back to network idle",
                    contract.exchange.url_fragment,
                    contract.timeout.as_millis()
                );
                let ceiling = contract.timeout.min(self.timings.fallback_idle);
                if !tap.wait_for_idle(self.timings.idle_quiet, ceiling).await {
                    tracing::debug!("Network still busy after {}ms, continuing", ceiling.as_millis());
                }
            }
        }
    }

    async fn settle(&self, tap: &NetworkTap, ceiling: Duration) {
        let idle_ceiling = self.timings.settle_idle.min(ceiling);
        if !tap.wait_for_idle(self.timings.idle_quiet, idle_ceiling).await {
            tracing::debug!("Network not idle after {}ms, continuing", idle_ceiling.as_millis());
        }
        tokio::time::sleep(self.timings.settle_delay.min(ceiling)).await;
    }

    /// Check the rendered structure against `structure`.
    ///
    /// Rows are looked up under the container, then page-wide, then the
    /// container text is checked for a "no results" phrase; a final wait,
    /// capped at `ceiling`, gives slow renders one more chance.
    pub async fn validate_structure(
        &self,
        page: &dyn PageDriver,
        structure: &StructureDescriptor,
        ceiling: Duration,
    ) -> Result<ValidatedStructure> {
        let container = &structure.container;
        if page.count(container).await? == 0 {
            return Err(ScrapeError::ContainerMissing(container.to_string()));
        }

        let scoped = container.locator(&structure.row);
        let mut rows_locator = scoped.clone();
        let mut scope = RowScope::Container;
        let mut rows = page.count(&scoped).await?;
        tracing::debug!("Rows under container: {}", rows);

        if rows == 0 {
            let page_wide = Locator::new(&structure.row);
            rows = page.count(&page_wide).await?;
            if rows > 0 {
                tracing::debug!("Rows found page-wide: {}", rows);
                rows_locator = page_wide;
                scope = RowScope::Page;
            }
        }

        if rows == 0 {
            let text = page.inner_text(container).await?;
            if structure.says_no_results(&text) {
                tracing::info!("Search returned no results");
                return Ok(ValidatedStructure {
                    rows: 0,
                    cells: 0,
                    rows_locator: scoped,
                    scope: RowScope::NoResults,
                });
            }

            let retry = self.timings.empty_retry_delay.min(ceiling);
            tracing::debug!("No rows yet, retrying in {}ms", retry.as_millis());
            tokio::time::sleep(retry).await;
            rows = page.count(&scoped).await?;
            if rows == 0 {
                return Err(ScrapeError::EmptyAfterWait(container.to_string()));
            }
            rows_locator = scoped;
            scope = RowScope::Container;
        }

        let cells = page
            .count(&rows_locator.first().locator(&structure.cell))
            .await?;
        if cells < structure.min_cells {
            return Err(ScrapeError::StructureMismatch {
                found: cells,
                expected: structure.min_cells,
            });
        }

        tracing::debug!("Table validated: {} rows, {} columns", rows, cells);
        Ok(ValidatedStructure {
            rows,
            cells,
            rows_locator,
            scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_from_config() {
        let config = WaitConfig {
            idle_quiet_ms: 250,
            settle_delay_ms: 0,
            ..WaitConfig::default()
        };
        let timings = WaitTimings::from(&config);
        assert_eq!(timings.idle_quiet, Duration::from_millis(250));
        assert_eq!(timings.settle_delay, Duration::ZERO);
        assert_eq!(
            timings.fallback_idle,
            Duration::from_millis(WaitConfig::default().fallback_idle_ms)
        );
    }

    #[test]
    fn test_production_policy_name() {
        let engine = CompletionEngine::production(WaitTimings::default());
        assert_eq!(engine.policy().name(), "production");
        assert!(engine.policy().open_capture(&NetworkTap::new()).is_none());
    }
}
