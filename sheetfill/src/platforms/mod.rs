use crate::{FillError, PageElement, Selector};

pub mod memory;

/// The common trait that every page backend must implement
///
/// Calls are synchronous: a page answers DOM queries immediately. Anything that
/// renders asynchronously (popups, lazily mounted widgets) simply is not in the
/// results yet, and callers are expected to poll.
pub trait PageEngine: Send + Sync {
    /// All rendered elements matching the selector, in document order
    fn query_all(&self, selector: &Selector) -> Result<Vec<PageElement>, FillError>;

    /// First rendered element matching the selector
    fn query_first(&self, selector: &Selector) -> Result<Option<PageElement>, FillError> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    /// Address of the loaded document, when the backend knows it
    fn url(&self) -> Option<String> {
        None
    }
}
