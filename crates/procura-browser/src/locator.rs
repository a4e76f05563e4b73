//! Chainable element locators.
//!
//! A [`Locator`] is a description, not a live handle: it is resolved
//! against the page every time a driver method is called, so it stays
//! valid across the partial re-renders JSF portals do after each AJAX call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One resolution step of a locator chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    /// CSS selector evaluated under each current match. A leading `>`
    /// means direct children of the current match.
    Css(String),
    /// XPath expression evaluated with each current match as context node.
    XPath(String),
    /// Innermost elements whose rendered text contains the given string.
    Text(String),
    /// Keep only the n-th current match (zero based).
    Nth(usize),
}

/// Chain of [`Step`]s, resolved left to right starting at the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    /// Locator for a selector at document level.
    ///
    /// Selectors prefixed with `xpath=` are treated as XPath, everything
    /// else as CSS.
    #[must_use]
    pub fn new(selector: &str) -> Self {
        Self {
            steps: vec![Self::parse_step(selector)],
        }
    }

    /// Page-wide text match.
    #[must_use]
    pub fn by_text(text: &str) -> Self {
        Self {
            steps: vec![Step::Text(text.to_string())],
        }
    }

    /// Descendants of this locator's matches that match `selector`.
    #[must_use]
    pub fn locator(&self, selector: &str) -> Self {
        self.with_step(Self::parse_step(selector))
    }

    /// Descendants of this locator's matches whose text contains `text`.
    #[must_use]
    pub fn get_by_text(&self, text: &str) -> Self {
        self.with_step(Step::Text(text.to_string()))
    }

    /// The n-th match of this locator.
    #[must_use]
    pub fn nth(&self, index: usize) -> Self {
        self.with_step(Step::Nth(index))
    }

    /// The first match of this locator.
    #[must_use]
    pub fn first(&self) -> Self {
        self.nth(0)
    }

    /// Steps in resolution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn with_step(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    fn parse_step(selector: &str) -> Step {
        match selector.strip_prefix("xpath=") {
            Some(expr) => Step::XPath(expr.to_string()),
            None => Step::Css(selector.to_string()),
        }
    }

    /// JavaScript expression that evaluates to the array of matched elements.
    #[must_use]
    pub fn resolver_script(&self) -> String {
        let mut script = String::from(
            "(() => { const uniq = a => Array.from(new Set(a)); let nodes = [document];",
        );

        for step in &self.steps {
            match step {
                Step::Css(selector) => {
                    let selector = if selector.trim_start().starts_with('>') {
                        format!(":scope {}", selector.trim_start())
                    } else {
                        selector.clone()
                    };
                    script.push_str(&format!(
                        " nodes = uniq(nodes.flatMap(n => Array.from(n.querySelectorAll({}))));",
                        js_string(&selector)
                    ));
                }
                Step::XPath(expr) => {
                    script.push_str(&format!(
                        " nodes = uniq(nodes.flatMap(n => {{ const r = document.evaluate({}, n, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }}));",
                        js_string(expr)
                    ));
                }
                Step::Text(text) => {
                    script.push_str(&format!(
                        " nodes = uniq(nodes.flatMap(n => {{ const t = {}; const has = e => (e.innerText || e.textContent || '').includes(t); return Array.from(n.querySelectorAll('*')).filter(e => has(e) && !Array.from(e.children).some(has)); }}));",
                        js_string(text)
                    ));
                }
                Step::Nth(index) => {
                    script.push_str(&format!(
                        " nodes = nodes.length > {index} ? [nodes[{index}]] : [];"
                    ));
                }
            }
        }

        script.push_str(" return nodes.filter(n => n !== document); })()");
        script
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Css(selector) => selector.clone(),
                Step::XPath(expr) => format!("xpath={expr}"),
                Step::Text(text) => format!("text={text}"),
                Step::Nth(index) => format!("nth={index}"),
            })
            .collect();
        write!(f, "{}", parts.join(" >> "))
    }
}

/// Quote a string as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
