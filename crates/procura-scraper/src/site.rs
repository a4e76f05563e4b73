//! Site layout: every selector and table shape the routines depend on.
//!
//! The layout is data, loaded from TOML, so a portal redesign is a file
//! change rather than a code change. [`SiteLayout::default`] describes the
//! current public procurement search portal.

use crate::contract::{CompletionContract, StructureDescriptor};
use crate::error::{Result, ScrapeError};
use procura_browser::{ExchangeMatcher, Locator};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder replaced by the option value in dropdown item templates.
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Complete layout description loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLayout {
    /// Search form controls
    pub search: SearchForm,
    /// Search results grid
    pub results: ResultsTable,
    /// Results paginator
    pub pagination: Pagination,
    /// Process detail sheet
    pub detail: DetailSheet,
    /// Response that completes a search or page change
    pub exchange: ExchangeMatcher,
    /// Phrases the results panel shows when nothing matched
    pub no_results_phrases: Vec<String>,
}

/// Search form controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchForm {
    pub search_type_tab: String,
    pub search_type_text: String,
    pub advanced_container: String,
    pub advanced_text: String,
    /// Child of a dropdown container that opens its panel
    pub dropdown_toggle: String,
    pub department_container: String,
    pub department_panel: String,
    pub department_item: String,
    pub year_container: String,
    pub year_panel: String,
    pub year_item: String,
    pub reference_input: String,
    pub search_button: String,
}

/// Search results grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsTable {
    pub container: String,
    pub rows: String,
    pub cell: String,
    pub min_cells: usize,
    /// Cell indices copied into each record, in record field order
    pub columns: Vec<usize>,
}

/// Results paginator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub container: String,
    pub next_button: String,
    pub disabled_class: String,
}

/// Process detail sheet with its schedule and documents tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailSheet {
    pub link: String,
    pub schedule_table: String,
    pub schedule_rows: String,
    pub schedule_cells: String,
    pub schedule_min_cells: usize,
    pub documents_table: String,
    pub documents_rows: String,
    pub documents_cells: String,
    pub documents_min_cells: usize,
    pub download_link: String,
    pub size_label: String,
}

const FORM: &str = "#tbBuscador\\:idFormBuscarProceso\\:";

impl Default for SearchForm {
    fn default() -> Self {
        Self {
            search_type_tab: "#tbBuscador".to_string(),
            search_type_text: "Buscador de Procedimientos de Selección".to_string(),
            advanced_container: format!("{FORM}pnlBuscarProceso"),
            advanced_text: "Búsqueda Avanzada".to_string(),
            dropdown_toggle: "> :last-child".to_string(),
            department_container: format!("{FORM}departamento"),
            department_panel: format!("{FORM}departamento_panel"),
            department_item: "li[data-label='{value}']".to_string(),
            year_container: format!("{FORM}anioConvocatoria"),
            year_panel: format!("{FORM}anioConvocatoria_panel"),
            year_item: "li[data-label='{value}']".to_string(),
            reference_input: format!("{FORM}siglasEntidad"),
            search_button: format!("{FORM}btnBuscarSelToken"),
        }
    }
}

impl Default for ResultsTable {
    fn default() -> Self {
        Self {
            container: format!("{FORM}pnlGrdResultadosProcesos"),
            // The grid renders "no data" as a single-cell row; it is not a result.
            rows: format!("{FORM}dtProcesos_data > tr:not(.ui-datatable-empty-message)"),
            cell: "td".to_string(),
            min_cells: 12,
            columns: vec![0, 1, 2, 3, 4, 5, 6, 9, 10, 11],
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            container: format!("{FORM}dtProcesos_paginator_bottom"),
            next_button: "span.ui-paginator-next".to_string(),
            disabled_class: "ui-state-disabled".to_string(),
        }
    }
}

impl Default for DetailSheet {
    fn default() -> Self {
        Self {
            link: "a:has(img[src*=\"fichaSeleccion.gif\"])".to_string(),
            schedule_table: "xpath=//thead[@id=\"tbFicha:dtCronograma_head\"]/parent::table"
                .to_string(),
            schedule_rows: "tbody tr".to_string(),
            schedule_cells: "td".to_string(),
            schedule_min_cells: 3,
            documents_table: "#tbFicha\\:dtDocumentos".to_string(),
            documents_rows: "tbody tr".to_string(),
            documents_cells: "td".to_string(),
            documents_min_cells: 5,
            download_link: "a:has(span)".to_string(),
            size_label: "a span".to_string(),
        }
    }
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            search: SearchForm::default(),
            results: ResultsTable::default(),
            pagination: Pagination::default(),
            detail: DetailSheet::default(),
            exchange: ExchangeMatcher::new("buscadorPublico.xhtml")
                .with_method("POST")
                .with_status(200),
            no_results_phrases: vec![
                "no hay".to_string(),
                "sin resultados".to_string(),
                "no se encontraron".to_string(),
            ],
        }
    }
}

impl SiteLayout {
    /// Parse and validate a layout.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let layout: Self =
            toml::from_str(contents).map_err(|e| ScrapeError::Layout(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load a layout file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let layout = Self::from_toml(&contents)?;
        tracing::info!("Loaded site layout from {}", path.display());
        Ok(layout)
    }

    /// Check that every selector is present and the table shapes agree.
    pub fn validate(&self) -> Result<()> {
        let selectors = [
            ("search.search_type_tab", &self.search.search_type_tab),
            ("search.search_type_text", &self.search.search_type_text),
            ("search.advanced_container", &self.search.advanced_container),
            ("search.advanced_text", &self.search.advanced_text),
            ("search.dropdown_toggle", &self.search.dropdown_toggle),
            ("search.department_container", &self.search.department_container),
            ("search.department_panel", &self.search.department_panel),
            ("search.year_container", &self.search.year_container),
            ("search.year_panel", &self.search.year_panel),
            ("search.reference_input", &self.search.reference_input),
            ("search.search_button", &self.search.search_button),
            ("results.container", &self.results.container),
            ("results.rows", &self.results.rows),
            ("results.cell", &self.results.cell),
            ("pagination.container", &self.pagination.container),
            ("pagination.next_button", &self.pagination.next_button),
            ("detail.link", &self.detail.link),
            ("detail.schedule_table", &self.detail.schedule_table),
            ("detail.documents_table", &self.detail.documents_table),
            ("exchange.url_fragment", &self.exchange.url_fragment),
        ];
        for (field, value) in selectors {
            if value.trim().is_empty() {
                return Err(ScrapeError::Layout(format!("{field} cannot be empty")));
            }
        }

        for (field, template) in [
            ("search.department_item", &self.search.department_item),
            ("search.year_item", &self.search.year_item),
        ] {
            if !template.contains(VALUE_PLACEHOLDER) {
                return Err(ScrapeError::Layout(format!(
                    "{field} must contain {VALUE_PLACEHOLDER}"
                )));
            }
        }

        if self.results.min_cells == 0 {
            return Err(ScrapeError::Layout(
                "results.min_cells must be at least 1".to_string(),
            ));
        }
        if let Some(&max) = self.results.columns.iter().max() {
            if max >= self.results.min_cells {
                return Err(ScrapeError::Layout(format!(
                    "results.columns index {max} is outside the {} guaranteed cells",
                    self.results.min_cells
                )));
            }
        } else {
            return Err(ScrapeError::Layout(
                "results.columns cannot be empty".to_string(),
            ));
        }

        if self.detail.schedule_min_cells < 3 {
            return Err(ScrapeError::Layout(
                "detail.schedule_min_cells must cover stage, start and end".to_string(),
            ));
        }
        if self.detail.documents_min_cells < 5 {
            return Err(ScrapeError::Layout(
                "detail.documents_min_cells must cover the five document columns".to_string(),
            ));
        }

        Ok(())
    }

    /// Contract for anything that reloads the results grid.
    #[must_use]
    pub fn results_contract(&self, timeout: Duration) -> CompletionContract {
        let structure = StructureDescriptor::new(
            Locator::new(&self.results.container),
            &self.results.rows,
            &self.results.cell,
            self.results.min_cells,
        )
        .with_no_results_phrases(&self.no_results_phrases);
        CompletionContract::new(self.exchange.clone(), structure, timeout)
    }
}

/// Fill a dropdown item template with a value, quoted for a CSS attribute.
#[must_use]
pub fn item_selector(template: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    template.replace(VALUE_PLACEHOLDER, &escaped)
}
