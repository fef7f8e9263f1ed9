use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FillError {
    #[error("Content script injection failed: {0}")]
    InjectionFailed(String),

    #[error("No dropdown trigger found: {0}")]
    TriggerNotFound(String),

    #[error("Option for \"{desired}\" not found (available: {observed:?})")]
    OptionNotFound {
        desired: String,
        observed: Vec<String>,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Could not read spreadsheet: {0}")]
    ParseFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("State storage error: {0}")]
    Storage(String),

    #[error("Message transport error: {0}")]
    Transport(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Page error: {0}")]
    Page(String),
}

impl FillError {
    /// Whether the error came from the page-side operator rather than the
    /// orchestrator's own plumbing.
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            FillError::TriggerNotFound(_)
                | FillError::OptionNotFound { .. }
                | FillError::InvalidSelector(_)
                | FillError::Page(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_errors_are_told_apart() {
        assert!(FillError::TriggerNotFound("Gender".into()).is_operator_error());
        assert!(!FillError::Timeout("fillForm".into()).is_operator_error());
        assert!(!FillError::InjectionFailed("no tab".into()).is_operator_error());
    }

    #[test]
    fn option_not_found_lists_what_was_there() {
        let err = FillError::OptionNotFound {
            desired: "Foreign".into(),
            observed: vec!["Domestic".into()],
        };
        assert_eq!(
            err.to_string(),
            r#"Option for "Foreign" not found (available: ["Domestic"])"#
        );
    }
}
