//! Search by process reference code and read its detail sheet.

use crate::error::{Result, ScrapeError};
use crate::portal::PortalSession;
use procura_browser::Locator;
use procura_jobs::JobContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Reference code (nomenclature) of a procurement process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceQuery {
    pub reference: String,
}

impl ReferenceQuery {
    #[must_use]
    pub fn new(reference: &str) -> Self {
        Self {
            reference: reference.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reference.is_empty() {
            return Err(ScrapeError::InvalidQuery(
                "reference cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One stage of the process schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub stage: String,
    pub start: String,
    pub end: String,
}

/// One published document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub number: String,
    pub stage: String,
    pub document: String,
    pub file_name: String,
    pub size: String,
    pub published_at: String,
}

/// Detail sheet contents for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceResult {
    pub reference: String,
    pub schedule: Vec<ScheduleEntry>,
    pub total_documents: usize,
    pub documents: Vec<DocumentEntry>,
}

/// Search a process by reference and read its schedule and documents.
pub async fn scrape_by_reference(
    session: &PortalSession<'_>,
    ctx: &JobContext,
    query: &ReferenceQuery,
) -> Result<ReferenceResult> {
    query.validate()?;
    let page = session.page();
    let layout = session.layout();

    ctx.checkpoint()?;
    session.open_portal().await?;
    ctx.checkpoint()?;
    session.select_search_type().await?;
    ctx.checkpoint()?;
    session.open_advanced_search().await?;

    ctx.checkpoint()?;
    tracing::info!("Entering reference {}", query.reference);
    let input = Locator::new(&layout.search.reference_input);
    session.wait_visible(&input, "reference input").await?;
    page.fill(&input, &query.reference).await?;
    session.pause().await;

    ctx.checkpoint()?;
    let results = session.search(&session.results_contract("search")).await?;
    if results.is_empty() {
        return Err(ScrapeError::ElementNotFound(format!(
            "no process matches reference {}",
            query.reference
        )));
    }

    ctx.checkpoint()?;
    open_detail_sheet(session).await?;

    ctx.checkpoint()?;
    let schedule = read_schedule(session).await?;

    ctx.checkpoint()?;
    let documents = read_documents(session, ctx).await?;

    tracing::info!(
        "Reference {}: {} schedule stages, {} documents",
        query.reference,
        schedule.len(),
        documents.len()
    );

    Ok(ReferenceResult {
        reference: query.reference.clone(),
        schedule,
        total_documents: documents.len(),
        documents,
    })
}

async fn open_detail_sheet(session: &PortalSession<'_>) -> Result<()> {
    tracing::info!("Opening detail sheet");
    let link = Locator::new(&session.layout().detail.link).first();
    session.click_when_visible(&link, "detail sheet link").await?;
    session.settle().await;
    Ok(())
}

async fn read_schedule(session: &PortalSession<'_>) -> Result<Vec<ScheduleEntry>> {
    let page = session.page();
    let detail = &session.layout().detail;

    let table = Locator::new(&detail.schedule_table);
    session.wait_visible(&table, "schedule table").await?;
    session.dump(&table, "schedule_table").await;

    let rows = table.locator(&detail.schedule_rows);
    let row_count = page.count(&rows).await?;
    let mut schedule = Vec::with_capacity(row_count);

    for index in 0..row_count {
        let cells = rows.nth(index).locator(&detail.schedule_cells);
        let cell_count = page.count(&cells).await?;
        if cell_count < detail.schedule_min_cells {
            tracing::warn!(
                "Schedule row {} has {} cells, expected at least {}",
                index + 1,
                cell_count,
                detail.schedule_min_cells
            );
            continue;
        }

        let stage = collapse_whitespace(&page.inner_text(&cells.nth(0)).await?);
        let start = page.inner_text(&cells.nth(1)).await?.trim().to_string();
        let end = first_line(&page.inner_text(&cells.nth(2)).await?);
        schedule.push(ScheduleEntry { stage, start, end });
    }

    Ok(schedule)
}

async fn read_documents(
    session: &PortalSession<'_>,
    ctx: &JobContext,
) -> Result<Vec<DocumentEntry>> {
    let page = session.page();
    let detail = &session.layout().detail;

    let table = Locator::new(&detail.documents_table);
    session.wait_visible(&table, "documents table").await?;
    session.pause().await;
    session.dump(&table, "documents_table").await;

    let rows = table.locator(&detail.documents_rows);
    let row_count = page.count(&rows).await?;
    let delay = Duration::from_millis(session.config().pacing.delay_between_documents_ms);
    let mut documents = Vec::with_capacity(row_count);

    for index in 0..row_count {
        ctx.checkpoint()?;
        match read_document(session, &rows.nth(index)).await {
            Ok(Some(document)) => documents.push(document),
            Ok(None) => {}
            // A malformed row should not lose the rest of the table.
            Err(ScrapeError::Browser(e)) => {
                tracing::warn!("Skipping document row {}: {}", index + 1, e);
            }
            Err(e) => return Err(e),
        }
        ctx.sleep(delay).await?;
    }

    Ok(documents)
}

async fn read_document(session: &PortalSession<'_>, row: &Locator) -> Result<Option<DocumentEntry>> {
    let page = session.page();
    let detail = &session.layout().detail;

    let cells = row.locator(&detail.documents_cells);
    let cell_count = page.count(&cells).await?;
    if cell_count < detail.documents_min_cells {
        tracing::warn!(
            "Document row has {} cells, expected at least {}",
            cell_count,
            detail.documents_min_cells
        );
        return Ok(None);
    }

    let file_cell = cells.nth(3);
    let size_label = file_cell.locator(&detail.size_label).first();
    let size = if page.count(&size_label).await? > 0 {
        page.inner_text(&size_label).await?.trim().to_string()
    } else {
        String::new()
    };

    let link = file_cell.locator(&detail.download_link).first();
    let file_name = if page.count(&link).await? > 0 {
        page.attribute(&link, "onclick")
            .await?
            .as_deref()
            .and_then(parse_download_file_name)
            .unwrap_or_default()
    } else {
        String::new()
    };

    Ok(Some(DocumentEntry {
        number: cell_text(session, &cells, 0).await?,
        stage: cell_text(session, &cells, 1).await?,
        document: cell_text(session, &cells, 2).await?,
        file_name,
        size,
        published_at: cell_text(session, &cells, 4).await?,
    }))
}

async fn cell_text(session: &PortalSession<'_>, cells: &Locator, index: usize) -> Result<String> {
    let text = session.page().inner_text(&cells.nth(index)).await?;
    Ok(text.trim().to_string())
}

/// File name from a `descargaDocGeneral('id','type','name')` handler.
#[must_use]
pub fn parse_download_file_name(onclick: &str) -> Option<String> {
    static DOWNLOAD_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = DOWNLOAD_REGEX.get_or_init(|| {
        Regex::new(r"descargaDocGeneral\('([^']+)','([^']+)','([^']+)'\)").expect("valid regex")
    });
    regex
        .captures(onclick)
        .and_then(|caps| caps.get(3))
        .map(|m| m.as_str().to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_line(text: &str) -> String {
    text.trim().lines().next().unwrap_or_default().trim().to_string()
}
