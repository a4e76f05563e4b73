//! Steps shared by every extraction routine.

use crate::completion::{CompletionEngine, ValidatedStructure};
use crate::contract::CompletionContract;
use crate::error::{Result, ScrapeError};
use crate::site::{item_selector, SiteLayout};
use procura_browser::{BrowserError, Locator, PageDriver};
use procura_core::AppConfig;
use std::time::Duration;

/// One job's view of the portal: its page, the layout, the engine and the
/// timing configuration.
pub struct PortalSession<'a> {
    page: &'a dyn PageDriver,
    layout: &'a SiteLayout,
    engine: &'a CompletionEngine,
    config: &'a AppConfig,
}

impl<'a> PortalSession<'a> {
    #[must_use]
    pub fn new(
        page: &'a dyn PageDriver,
        layout: &'a SiteLayout,
        engine: &'a CompletionEngine,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            page,
            layout,
            engine,
            config,
        }
    }

    #[must_use]
    pub fn page(&self) -> &'a dyn PageDriver {
        self.page
    }

    #[must_use]
    pub fn layout(&self) -> &'a SiteLayout {
        self.layout
    }

    #[must_use]
    pub fn config(&self) -> &'a AppConfig {
        self.config
    }

    /// Results-grid contract bounded by the configured network timeout.
    #[must_use]
    pub fn results_contract(&self, label: &str) -> CompletionContract {
        self.layout
            .results_contract(Duration::from_millis(self.config.waits.network_timeout_ms))
            .with_label(label)
    }

    /// Load the search portal.
    pub async fn open_portal(&self) -> Result<()> {
        let url = &self.config.site.base_url;
        tracing::info!("Opening portal {}", url);
        self.page.navigate(url).await?;
        self.settle().await;
        Ok(())
    }

    /// Switch to the procurement process search.
    pub async fn select_search_type(&self) -> Result<()> {
        let search = &self.layout.search;
        tracing::info!("Selecting search type: {}", search.search_type_text);
        let tab = Locator::new(&search.search_type_tab).get_by_text(&search.search_type_text);
        self.click_when_visible(&tab, "search type tab").await?;
        self.settle().await;
        Ok(())
    }

    /// Expand the advanced search form.
    pub async fn open_advanced_search(&self) -> Result<()> {
        let search = &self.layout.search;
        tracing::info!("Opening advanced search");
        let toggle = Locator::new(&search.advanced_container).get_by_text(&search.advanced_text);
        self.click_when_visible(&toggle, "advanced search toggle").await?;
        self.settle().await;
        Ok(())
    }

    /// Open a dropdown and pick the item whose label equals `value`.
    pub async fn pick_option(
        &self,
        container: &str,
        panel: &str,
        item_template: &str,
        value: &str,
        dump_name: &str,
    ) -> Result<()> {
        tracing::info!("Selecting {} in {}", value, container);
        let toggle = Locator::new(container).locator(&self.layout.search.dropdown_toggle);
        self.click_when_visible(&toggle, container).await?;
        self.pause().await;

        let panel = Locator::new(panel);
        self.dump(&panel, dump_name).await;

        let item = panel.locator(&item_selector(item_template, value));
        self.click_when_visible(&item, &format!("option '{value}'")).await?;
        self.pause().await;
        Ok(())
    }

    /// Run the search and wait for the results grid.
    pub async fn search(&self, contract: &CompletionContract) -> Result<ValidatedStructure> {
        let button = Locator::new(&self.layout.search.search_button);
        self.wait_visible(&button, "search button").await?;
        self.engine.resolve(self.page, &button, contract).await
    }

    /// Move to the next results page.
    ///
    /// Returns `None` on the last page (next button disabled) or when the
    /// grid has no paginator at all.
    pub async fn next_page(
        &self,
        contract: &CompletionContract,
    ) -> Result<Option<ValidatedStructure>> {
        let pagination = &self.layout.pagination;
        let container = Locator::new(&pagination.container);
        if self.page.count(&container).await? == 0 {
            tracing::info!("No paginator rendered, single page of results");
            return Ok(None);
        }
        self.dump(&container, "paginator").await;

        let next = container.locator(&pagination.next_button);
        self.wait_visible(&next, "next page button").await?;

        let class = self.page.attribute(&next, "class").await?.unwrap_or_default();
        if class
            .split_whitespace()
            .any(|c| c == pagination.disabled_class)
        {
            tracing::info!("Reached the last page");
            return Ok(None);
        }

        self.engine.resolve(self.page, &next, contract).await.map(Some)
    }

    /// Wait for a visible match, reporting `what` when it never shows up.
    pub async fn wait_visible(&self, target: &Locator, what: &str) -> Result<()> {
        match self
            .page
            .wait_visible(target, self.config.browser.element_wait_timeout())
            .await
        {
            Ok(()) => Ok(()),
            Err(BrowserError::Timeout(_)) => {
                Err(ScrapeError::ElementNotFound(format!("{what} ({target})")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Click once the target is visible.
    pub async fn click_when_visible(&self, target: &Locator, what: &str) -> Result<()> {
        self.wait_visible(target, what).await?;
        self.page.click(target).await?;
        Ok(())
    }

    /// Let the network go quiet after a full page interaction.
    pub async fn settle(&self) {
        let timings = self.engine.timings();
        if !self
            .page
            .network()
            .wait_for_idle(timings.idle_quiet, timings.fallback_idle)
            .await
        {
            tracing::debug!("Network still busy, continuing");
        }
        self.pause().await;
    }

    /// Short delay between UI interactions.
    pub async fn pause(&self) {
        tokio::time::sleep(Duration::from_millis(
            self.config.pacing.interaction_delay_ms,
        ))
        .await;
    }

    /// Hand an element's markup to the wait policy.
    pub async fn dump(&self, target: &Locator, name: &str) {
        self.engine
            .policy()
            .record_artifact(self.page, target, name)
            .await;
    }
}
