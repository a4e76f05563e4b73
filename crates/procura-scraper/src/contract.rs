//! What "the update finished" means for one call site.

use procura_browser::{ExchangeMatcher, Locator};
use std::time::Duration;

/// Structural expectations checked once the network signal settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureDescriptor {
    /// Element wrapping the rendered results
    pub container: Locator,
    /// Row selector, resolved under the container first and page-wide second
    pub row: String,
    /// Cell selector, resolved under the first row
    pub cell: String,
    /// Fewest cells the first row may have
    pub min_cells: usize,
    /// Lower-case phrases that mark a legitimately empty result
    pub no_results_phrases: Vec<String>,
}

impl StructureDescriptor {
    #[must_use]
    pub fn new(container: Locator, row: &str, cell: &str, min_cells: usize) -> Self {
        Self {
            container,
            row: row.to_string(),
            cell: cell.to_string(),
            min_cells,
            no_results_phrases: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_no_results_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.no_results_phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Whether the container text announces an empty result.
    #[must_use]
    pub fn says_no_results(&self, container_text: &str) -> bool {
        let text = container_text.to_lowercase();
        self.no_results_phrases
            .iter()
            .any(|phrase| text.contains(phrase.as_str()))
    }
}

/// Exchange predicate, structure and time budget for one `resolve` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContract {
    /// Response that signals the server answered
    pub exchange: ExchangeMatcher,
    /// Expected rendered structure
    pub structure: StructureDescriptor,
    /// Ceiling for every wait performed on behalf of this contract
    pub timeout: Duration,
    /// Short name used in diagnostic file names
    pub label: String,
}

impl CompletionContract {
    #[must_use]
    pub fn new(exchange: ExchangeMatcher, structure: StructureDescriptor, timeout: Duration) -> Self {
        Self {
            exchange,
            structure,
            timeout,
            label: "action".to_string(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_results_phrases_are_case_insensitive() {
        let structure = StructureDescriptor::new(Locator::new("#results"), "tr", "td", 12)
            .with_no_results_phrases(["No se encontraron", "sin resultados"]);

        assert!(structure.says_no_results("NO SE ENCONTRARON Datos"));
        assert!(structure.says_no_results("Búsqueda sin resultados."));
        assert!(!structure.says_no_results("Mostrando 1 - 15 de 230"));
    }

    #[test]
    fn test_contract_label() {
        let contract = CompletionContract::new(
            ExchangeMatcher::new("buscadorPublico.xhtml"),
            StructureDescriptor::new(Locator::new("#results"), "tr", "td", 1),
            Duration::from_secs(30),
        )
        .with_label("page_2");
        assert_eq!(contract.label, "page_2");
    }
}
