//! Scripted in-memory page for driving the engine and routines without a
//! browser. Elements are keyed by the `Display` form of their locator.

#![allow(dead_code)]

use async_trait::async_trait;
use procura_browser::{BrowserError, Exchange, Locator, NetworkTap, PageDriver};
use procura_core::AppConfig;
use procura_scraper::site::item_selector;
use procura_scraper::{SiteLayout, WaitTimings};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SEARCH_URL: &str =
    "https://prod2.seace.gob.pe/seacebus-uiwd-pub/buscadorPublico/buscadorPublico.xhtml";

/// Bytes every screenshot of the mock starts with.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub count: usize,
    pub visible: bool,
    pub text: String,
    pub attrs: HashMap<String, String>,
}

impl Element {
    pub fn visible(text: &str) -> Self {
        Self {
            count: 1,
            visible: true,
            text: text.to_string(),
            attrs: HashMap::new(),
        }
    }

    pub fn many(count: usize) -> Self {
        Self {
            count,
            visible: true,
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub enum Effect {
    Publish(Exchange),
    Set(String, Element),
    Remove(String),
}

#[derive(Default)]
pub struct MockPage {
    tap: NetworkTap,
    dom: Mutex<HashMap<String, Element>>,
    scripts: Mutex<HashMap<String, VecDeque<Vec<Effect>>>>,
    clicks: Mutex<Vec<String>>,
    fills: Mutex<Vec<(String, String)>>,
    navigations: Mutex<Vec<String>>,
    closed: Arc<AtomicBool>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, target: &Locator, element: Element) {
        self.dom
            .lock()
            .unwrap()
            .insert(target.to_string(), element);
    }

    pub fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Publish(exchange) => self.tap.publish(exchange),
                Effect::Set(key, element) => {
                    self.dom.lock().unwrap().insert(key, element);
                }
                Effect::Remove(key) => {
                    self.dom.lock().unwrap().remove(&key);
                }
            }
        }
    }

    /// Effects to run on the next click of `target` (one entry per click).
    pub fn on_click(&self, target: &Locator, effects: Vec<Effect>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push_back(effects);
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.fills.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flag that stays observable after the page is handed away.
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    fn element(&self, target: &Locator) -> Option<Element> {
        self.dom.lock().unwrap().get(&target.to_string()).cloned()
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, url: &str) -> procura_browser::Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn count(&self, target: &Locator) -> procura_browser::Result<usize> {
        Ok(self.element(target).map_or(0, |e| e.count))
    }

    async fn is_visible(&self, target: &Locator) -> procura_browser::Result<bool> {
        Ok(self.element(target).is_some_and(|e| e.count > 0 && e.visible))
    }

    async fn inner_text(&self, target: &Locator) -> procura_browser::Result<String> {
        self.element(target)
            .map(|e| e.text)
            .ok_or_else(|| BrowserError::SelectorNotFound(target.to_string()))
    }

    async fn attribute(&self, target: &Locator, name: &str) -> procura_browser::Result<Option<String>> {
        self.element(target)
            .map(|e| e.attrs.get(name).cloned())
            .ok_or_else(|| BrowserError::SelectorNotFound(target.to_string()))
    }

    async fn click(&self, target: &Locator) -> procura_browser::Result<()> {
        if self.element(target).map_or(0, |e| e.count) == 0 {
            return Err(BrowserError::SelectorNotFound(target.to_string()));
        }
        let key = target.to_string();
        self.clicks.lock().unwrap().push(key.clone());

        let effects = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(effects) = effects {
            self.apply(effects);
        }
        Ok(())
    }

    async fn fill(&self, target: &Locator, value: &str) -> procura_browser::Result<()> {
        if self.element(target).is_none() {
            return Err(BrowserError::SelectorNotFound(target.to_string()));
        }
        self.fills
            .lock()
            .unwrap()
            .push((target.to_string(), value.to_string()));
        Ok(())
    }

    async fn outer_html(&self, target: &Locator) -> procura_browser::Result<String> {
        self.element(target)
            .map(|e| format!("<div>{}</div>", e.text))
            .ok_or_else(|| BrowserError::SelectorNotFound(target.to_string()))
    }

    async fn screenshot(&self) -> procura_browser::Result<Vec<u8>> {
        Ok(PNG_SIGNATURE.to_vec())
    }

    fn network(&self) -> &NetworkTap {
        &self.tap
    }

    async fn close(&self) -> procura_browser::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Request and response of one JSF postback.
pub fn postback() -> Vec<Effect> {
    vec![
        Effect::Publish(Exchange::request("POST", SEARCH_URL, Some("xhr"))),
        Effect::Publish(Exchange::response(Some("POST"), SEARCH_URL, 200).with_resource_type("xhr")),
    ]
}

pub fn fast_timings() -> WaitTimings {
    WaitTimings {
        idle_quiet: Duration::from_millis(10),
        fallback_idle: Duration::from_millis(100),
        settle_idle: Duration::from_millis(50),
        settle_delay: Duration::ZERO,
        empty_retry_delay: Duration::from_millis(20),
    }
}

pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.waits.network_timeout_ms = 2_000;
    config.waits.fallback_idle_ms = 100;
    config.waits.settle_idle_ms = 50;
    config.waits.settle_delay_ms = 0;
    config.waits.empty_retry_delay_ms = 20;
    config.waits.idle_quiet_ms = 10;
    config.waits.capture_grace_ms = 10;
    config.pacing.delay_between_pages_ms = 0;
    config.pacing.delay_between_documents_ms = 0;
    config.pacing.interaction_delay_ms = 0;
    config.browser.element_wait_timeout_ms = 300;
    config
}

/// Locator yielding the result rows scoped under the results container.
pub fn result_rows(layout: &SiteLayout) -> Locator {
    Locator::new(&layout.results.container).locator(&layout.results.rows)
}

/// Effects that render `rows` into the results grid.
pub fn grid(layout: &SiteLayout, rows: &[Vec<String>]) -> Vec<Effect> {
    let rows_locator = result_rows(layout);
    let mut effects = vec![
        Effect::Set(
            Locator::new(&layout.results.container).to_string(),
            Element::visible(""),
        ),
        Effect::Set(rows_locator.to_string(), Element::many(rows.len())),
    ];
    for (r, row) in rows.iter().enumerate() {
        let cells = rows_locator.nth(r).locator(&layout.results.cell);
        effects.push(Effect::Set(cells.to_string(), Element::many(row.len())));
        for (c, text) in row.iter().enumerate() {
            effects.push(Effect::Set(cells.nth(c).to_string(), Element::visible(text)));
        }
    }
    effects
}

/// A 12-cell results row whose extracted columns are tagged with `tag`.
pub fn process_row(tag: &str) -> Vec<String> {
    (0..12).map(|c| format!("{tag}-{c}")).collect()
}

/// Make the portal navigation steps before the search available.
pub fn portal_controls(page: &MockPage, layout: &SiteLayout) {
    let search = &layout.search;
    page.set(
        &Locator::new(&search.search_type_tab).get_by_text(&search.search_type_text),
        Element::visible(&search.search_type_text),
    );
    page.set(
        &Locator::new(&search.advanced_container).get_by_text(&search.advanced_text),
        Element::visible(&search.advanced_text),
    );
    page.set(&Locator::new(&search.search_button), Element::visible("Buscar"));
}

/// Make both dropdowns open and offer `department` and `year`.
pub fn dropdowns(page: &MockPage, layout: &SiteLayout, department: &str, year: &str) {
    let search = &layout.search;
    for (container, panel, template, value) in [
        (
            &search.department_container,
            &search.department_panel,
            &search.department_item,
            department,
        ),
        (&search.year_container, &search.year_panel, &search.year_item, year),
    ] {
        page.set(
            &Locator::new(container).locator(&search.dropdown_toggle),
            Element::visible(""),
        );
        page.set(
            &Locator::new(panel).locator(&item_selector(template, value)),
            Element::visible(value),
        );
    }
}
