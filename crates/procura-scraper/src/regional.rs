//! Regional search: every process published in a department for a year.

use crate::completion::ValidatedStructure;
use crate::error::{Result, ScrapeError};
use crate::portal::PortalSession;
use procura_jobs::JobContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Department and call year to search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalQuery {
    /// Department label as shown in the portal, e.g. `AREQUIPA`
    pub department: String,
    /// Four-digit call year
    pub year: String,
}

impl RegionalQuery {
    #[must_use]
    pub fn new(department: &str, year: &str) -> Self {
        Self {
            department: department.trim().to_string(),
            year: year.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.department.is_empty() {
            return Err(ScrapeError::InvalidQuery(
                "department cannot be empty".to_string(),
            ));
        }
        if self.year.len() != 4 || !self.year.chars().all(|c| c.is_ascii_digit()) {
            return Err(ScrapeError::InvalidQuery(format!(
                "year must have four digits, got '{}'",
                self.year
            )));
        }
        Ok(())
    }
}

/// One row of the results grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub index: String,
    pub entity: String,
    pub published_at: String,
    pub reference: String,
    pub restarted_from: String,
    pub contract_object: String,
    pub description: String,
    pub estimated_value: String,
    pub currency: String,
    pub seace_version: String,
}

impl ProcessRecord {
    /// Build a record from the extracted columns, in layout order.
    /// Missing trailing columns are left empty.
    #[must_use]
    pub fn from_columns(columns: Vec<String>) -> Self {
        let mut values = columns.into_iter();
        let mut next = || values.next().unwrap_or_default();
        Self {
            index: next(),
            entity: next(),
            published_at: next(),
            reference: next(),
            restarted_from: next(),
            contract_object: next(),
            description: next(),
            estimated_value: next(),
            currency: next(),
            seace_version: next(),
        }
    }
}

/// Everything a regional search produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalResult {
    pub department: String,
    pub year: String,
    pub pages: usize,
    pub total_records: usize,
    pub records: Vec<ProcessRecord>,
}

/// Run a regional search and walk every results page.
pub async fn scrape_regional(
    session: &PortalSession<'_>,
    ctx: &JobContext,
    query: &RegionalQuery,
) -> Result<RegionalResult> {
    query.validate()?;
    let layout = session.layout();
    let search = &layout.search;

    ctx.checkpoint()?;
    session.open_portal().await?;
    ctx.checkpoint()?;
    session.select_search_type().await?;
    ctx.checkpoint()?;
    session.open_advanced_search().await?;

    ctx.checkpoint()?;
    session
        .pick_option(
            &search.department_container,
            &search.department_panel,
            &search.department_item,
            &query.department,
            &format!("department_panel_{}", query.department),
        )
        .await?;
    ctx.checkpoint()?;
    session
        .pick_option(
            &search.year_container,
            &search.year_panel,
            &search.year_item,
            &query.year,
            &format!("year_panel_{}", query.year),
        )
        .await?;

    ctx.checkpoint()?;
    let first = session.search(&session.results_contract("search")).await?;
    let mut records = extract_page(session, &first).await?;
    let mut pages = 1;
    tracing::info!("Page {}: {} records", pages, records.len());

    if !first.is_empty() {
        let delay = Duration::from_millis(session.config().pacing.delay_between_pages_ms);
        loop {
            ctx.checkpoint()?;
            let contract = session.results_contract(&format!("page_{}", pages + 1));
            let Some(structure) = session.next_page(&contract).await? else {
                break;
            };
            pages += 1;

            let page_records = extract_page(session, &structure).await?;
            tracing::info!("Page {}: {} records", pages, page_records.len());
            records.extend(page_records);

            ctx.sleep(delay).await?;
        }
    }

    if records.is_empty() {
        tracing::warn!(
            "No records for department={}, year={}",
            query.department,
            query.year
        );
    } else {
        tracing::info!("Regional search done: {} pages, {} records", pages, records.len());
    }

    Ok(RegionalResult {
        department: query.department.clone(),
        year: query.year.clone(),
        pages,
        total_records: records.len(),
        records,
    })
}

/// Extract the configured columns of every validated row.
///
/// Rows without cells or with only blank columns are skipped.
pub async fn extract_page(
    session: &PortalSession<'_>,
    structure: &ValidatedStructure,
) -> Result<Vec<ProcessRecord>> {
    let page = session.page();
    let results = &session.layout().results;
    let mut records = Vec::with_capacity(structure.rows);

    for row_index in 0..structure.rows {
        let cells = structure
            .rows_locator
            .nth(row_index)
            .locator(&results.cell);
        let cell_count = page.count(&cells).await?;
        if cell_count == 0 {
            continue;
        }

        let mut columns = Vec::with_capacity(results.columns.len());
        for &column in &results.columns {
            let text = if column < cell_count {
                page.inner_text(&cells.nth(column)).await?.trim().to_string()
            } else {
                String::new()
            };
            columns.push(text);
        }

        if columns.iter().any(|c| !c.is_empty()) {
            records.push(ProcessRecord::from_columns(columns));
        }
    }

    Ok(records)
}
