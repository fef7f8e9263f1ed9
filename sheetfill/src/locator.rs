use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::element::PageElement;
use crate::errors::FillError;
use crate::platforms::PageEngine;
use crate::selector::Selector;
use std::fmt;
use std::sync::Arc;

/// One way of pointing at an element, tried without side effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// First element matching the selector
    First(Selector),
    /// The `index`-th (0-based) element matching the selector
    Nth { selector: Selector, index: usize },
}

impl LocatorStrategy {
    pub fn first(selector: impl Into<Selector>) -> Self {
        LocatorStrategy::First(selector.into())
    }

    pub fn nth(selector: impl Into<Selector>, index: usize) -> Self {
        LocatorStrategy::Nth {
            selector: selector.into(),
            index,
        }
    }

    /// Apply the strategy once. `Ok(None)` means "nothing here, try the next one".
    pub fn locate(&self, engine: &dyn PageEngine) -> Result<Option<PageElement>, FillError> {
        match self {
            LocatorStrategy::First(selector) => engine.query_first(selector),
            LocatorStrategy::Nth { selector, index } => {
                Ok(engine.query_all(selector)?.into_iter().nth(*index))
            }
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorStrategy::First(selector) => write!(f, "{selector}"),
            LocatorStrategy::Nth { selector, index } => write!(f, "{selector} #{index}"),
        }
    }
}

/// An ordered fallback chain of locator strategies
///
/// Third-party widgets rarely expose a stable hook, so each target is described
/// by several guesses, most specific first. The first guess that finds
/// something wins; later ones are never consulted.
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn PageEngine>,
    strategies: Vec<LocatorStrategy>,
}

impl Locator {
    pub fn new(engine: Arc<dyn PageEngine>, strategies: Vec<LocatorStrategy>) -> Self {
        Self { engine, strategies }
    }

    /// Run the chain once and return the first element any strategy yields
    #[instrument(level = "debug", skip(self), fields(strategies = self.strategies.len()))]
    pub fn locate(&self) -> Result<Option<PageElement>, FillError> {
        for (i, strategy) in self.strategies.iter().enumerate() {
            if let Some(element) = strategy.locate(self.engine.as_ref())? {
                debug!(strategy = i, %strategy, "Locator strategy matched");
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    pub fn selector_string(&self) -> String {
        self.strategies
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Elements from the first selector that yields any, or an empty list
pub fn first_non_empty(
    engine: &dyn PageEngine,
    selectors: &[Selector],
) -> Result<Vec<PageElement>, FillError> {
    for selector in selectors {
        let found = engine.query_all(selector)?;
        if !found.is_empty() {
            debug!(%selector, count = found.len(), "Selector yielded elements");
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Elements from every selector, de-duplicated, in selector order
pub fn union_of(
    engine: &dyn PageEngine,
    selectors: &[Selector],
) -> Result<Vec<PageElement>, FillError> {
    let mut all: Vec<PageElement> = Vec::new();
    for selector in selectors {
        for element in engine.query_all(selector)? {
            if !all.contains(&element) {
                all.push(element);
            }
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::memory::{ComboBox, MemoryPage};

    fn page_with_two_selects() -> MemoryPage {
        let page = MemoryPage::new();
        page.add_combobox(ComboBox::new(["a"]));
        page.add_combobox(ComboBox::new(["b"]));
        page
    }

    #[test]
    fn falls_through_to_later_strategies() {
        let page = page_with_two_selects();
        let locator = Locator::new(
            Arc::new(page),
            vec![
                LocatorStrategy::nth(Selector::role("combobox"), 5),
                LocatorStrategy::first(r#"div[role="combobox"]:nth-child(2)"#),
                LocatorStrategy::nth(".MuiSelect-select", 1),
            ],
        );
        // Comboboxes are always the first child of their wrapper, so only the
        // class-based strategy can find the second one.
        let found = locator.locate().unwrap().expect("third strategy should match");
        let all = locator.engine.query_all(&Selector::role("combobox")).unwrap();
        assert_eq!(found, all[1]);
    }

    #[test]
    fn no_strategy_matches() {
        let locator = Locator::new(
            Arc::new(MemoryPage::new()),
            vec![LocatorStrategy::first(Selector::role("combobox"))],
        );
        assert!(locator.locate().unwrap().is_none());
        assert_eq!(locator.selector_string(), r#"[role="combobox"]"#);
    }

    #[test]
    fn union_deduplicates() {
        let page = page_with_two_selects();
        let selectors = vec![Selector::role("combobox"), Selector::class("MuiSelect-select")];
        assert_eq!(union_of(&page, &selectors).unwrap().len(), 2);
        assert_eq!(first_non_empty(&page, &selectors).unwrap().len(), 2);
        assert!(first_non_empty(&page, &[Selector::role("option")])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn strategies_deserialize_from_json() {
        let json = r#"[{"nth":{"selector":"[role=\"combobox\"]","index":1}},{"first":".MuiSelect-select"}]"#;
        let strategies: Vec<LocatorStrategy> = serde_json::from_str(json).unwrap();
        assert_eq!(strategies[0], LocatorStrategy::nth(Selector::role("combobox"), 1));
        assert_eq!(strategies[1], LocatorStrategy::first(Selector::class("MuiSelect-select")));
    }
}
