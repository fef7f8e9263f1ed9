//! The field mapping for the target form
//!
//! This is configuration, not derived data. The built-in table describes the
//! tourist registration form; a replacement can be loaded from JSON when the
//! form changes.

use crate::config::{millis, MatchPolicy};
use crate::errors::FillError;
use crate::locator::LocatorStrategy;
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const FULL_NAME: &str = "Full Name";
pub const MOBILE_NO: &str = "Mobile No";
pub const IDENTITY_NO: &str = "Identity No";
pub const TOURIST_TYPE: &str = "Tourist Type";
pub const IDENTITY_PROOF: &str = "Select Identity Proof";
pub const GENDER: &str = "Select Gender";

/// A plain text input filled by direct assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    /// Record label supplying the value
    pub label: String,
    pub selector: Selector,
}

/// How to wait for a popup's options to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discovery {
    /// Look up to `attempts` times, suspending `backoff` between looks
    Polling {
        attempts: u32,
        #[serde(rename = "backoff_ms", with = "millis")]
        backoff: Duration,
    },
    /// Wait once, then look once
    Settled {
        #[serde(rename = "wait_ms", with = "millis")]
        wait: Duration,
    },
}

impl Discovery {
    pub const POLLING: Discovery = Discovery::Polling {
        attempts: 4,
        backoff: Duration::from_millis(500),
    };
    pub const SETTLED: Discovery = Discovery::Settled {
        wait: Duration::from_millis(1000),
    };
}

/// A custom dropdown widget and how to operate it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownSpec {
    /// Human name used in messages
    pub name: String,
    /// Record label supplying the desired option
    pub label: String,
    /// Trigger locators, most specific first
    pub triggers: Vec<LocatorStrategy>,
    /// Option selectors, most specific first
    pub options: Vec<Selector>,
    pub discovery: Discovery,
    /// Pause after a selection so widgets it reveals can mount
    #[serde(default, rename = "settle_after_ms", with = "millis")]
    pub settle_after: Duration,
    /// Overrides the filler-wide policy for this widget only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_policy: Option<MatchPolicy>,
}

/// Everything the operator knows about the target form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormLayout {
    pub text_fields: Vec<TextField>,
    /// Operated strictly in this order
    pub dropdowns: Vec<DropdownSpec>,
    /// Controls reset before every fill
    #[serde(default = "default_clearable")]
    pub clearable: Selector,
}

fn default_clearable() -> Selector {
    Selector::from("input, textarea, select")
}

fn menu_option_selectors() -> Vec<Selector> {
    vec![
        Selector::role("option"),
        Selector::class("MuiMenuItem-root"),
        Selector::from(r#"li[role="option"]"#),
    ]
}

/// The Identity Proof and Gender widgets share one shape: the Nth combobox on
/// the page, polled once after a fixed wait.
fn nth_select(name: &str, label: &str, index: usize) -> DropdownSpec {
    DropdownSpec {
        name: name.to_string(),
        label: label.to_string(),
        triggers: vec![
            LocatorStrategy::nth(Selector::role("combobox"), index),
            LocatorStrategy::first(format!(r#"div[role="combobox"]:nth-child({})"#, index + 1)),
            LocatorStrategy::nth(Selector::class("MuiSelect-select"), index),
        ],
        options: menu_option_selectors(),
        discovery: Discovery::SETTLED,
        settle_after: Duration::ZERO,
        match_policy: None,
    }
}

impl FormLayout {
    /// The tourist registration form this crate was built for
    pub fn tourist_registration() -> Self {
        let text_field = |label: &str, placeholder: &str| TextField {
            label: label.to_string(),
            selector: Selector::from(format!(r#"input[placeholder="{placeholder}"]"#)),
        };

        let mut tourist_options = menu_option_selectors();
        tourist_options.push(Selector::from(r#"ul[role="listbox"] > li"#));
        tourist_options.push(Selector::from(".MuiList-root > li"));

        Self {
            text_fields: vec![
                text_field(FULL_NAME, "Enter Full name"),
                text_field(MOBILE_NO, "Enter Mobile No."),
                text_field(IDENTITY_NO, "Enter Identity No."),
            ],
            dropdowns: vec![
                DropdownSpec {
                    name: "Tourist Type".to_string(),
                    label: TOURIST_TYPE.to_string(),
                    triggers: vec![
                        LocatorStrategy::first(r#"div[role="combobox"][tabindex="0"]"#),
                        LocatorStrategy::first(Selector::class("MuiSelect-select")),
                        LocatorStrategy::first(r#"[aria-haspopup="listbox"]"#),
                    ],
                    options: tourist_options,
                    discovery: Discovery::POLLING,
                    // Identity Proof and Gender appear only once this is chosen
                    settle_after: Duration::from_millis(300),
                    match_policy: None,
                },
                nth_select("Identity Proof", IDENTITY_PROOF, 1),
                nth_select("Gender", GENDER, 2),
            ],
            clearable: default_clearable(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, FillError> {
        serde_json::from_str(json).map_err(|e| FillError::Config(format!("invalid layout: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FillError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FillError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Every record label the layout consumes, in fill order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.text_fields
            .iter()
            .map(|f| f.label.as_str())
            .chain(self.dropdowns.iter().map(|d| d.label.as_str()))
    }
}

impl Default for FormLayout {
    fn default() -> Self {
        Self::tourist_registration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_order() {
        let layout = FormLayout::default();
        let labels: Vec<&str> = layout.labels().collect();
        assert_eq!(
            labels,
            vec![FULL_NAME, MOBILE_NO, IDENTITY_NO, TOURIST_TYPE, IDENTITY_PROOF, GENDER]
        );
        assert_eq!(layout.dropdowns[0].discovery, Discovery::POLLING);
        assert_eq!(layout.dropdowns[2].discovery, Discovery::SETTLED);
        assert_eq!(layout.dropdowns[0].settle_after, Duration::from_millis(300));
        assert_eq!(layout.dropdowns[1].settle_after, Duration::ZERO);
        assert!(layout.text_fields.iter().all(|f| f.selector.is_valid()));
    }

    #[test]
    fn layout_survives_json() {
        let layout = FormLayout::default();
        let json = serde_json::to_string(&layout).unwrap();
        assert_eq!(FormLayout::from_json_str(&json).unwrap(), layout);
    }

    #[test]
    fn bad_selector_in_layout_is_rejected() {
        let json = r#"{"text_fields":[{"label":"x","selector":"div span"}],"dropdowns":[]}"#;
        assert!(matches!(
            FormLayout::from_json_str(json),
            Err(FillError::Config(_))
        ));
    }
}
