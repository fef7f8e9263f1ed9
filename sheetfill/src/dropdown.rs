//! Selecting an option in a custom dropdown widget
//!
//! The target widgets are third-party components with no programmatic "set
//! value". The only way in is to act like a user: find the trigger, open the
//! popup, wait for the list to render, click the matching entry. Every step is
//! fallible and every lookup has fallback locators.

use crate::config::MatchPolicy;
use crate::element::{DomEvent, ElementSnapshot, PageElement};
use crate::errors::FillError;
use crate::layout::{Discovery, DropdownSpec};
use crate::locator::{first_non_empty, union_of, Locator};
use crate::platforms::PageEngine;
use crate::selector::Selector;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Select `desired` in the widget described by `dropdown`
///
/// Resolves with a confirmation message. Fails fast with
/// [`FillError::TriggerNotFound`] when no trigger locator matches, and with
/// [`FillError::OptionNotFound`] carrying the option labels seen on the last
/// look when discovery runs out. `policy` applies unless the widget carries
/// its own.
#[instrument(skip(engine, dropdown, policy), fields(name = %dropdown.name))]
pub async fn select_option(
    engine: &Arc<dyn PageEngine>,
    dropdown: &DropdownSpec,
    desired: &str,
    policy: MatchPolicy,
) -> Result<String, FillError> {
    let policy = dropdown.match_policy.unwrap_or(policy);
    let locator = Locator::new(engine.clone(), dropdown.triggers.clone());

    let Some(trigger) = locator.locate()? else {
        // Retrying cannot change the page structure
        log_comboboxes(engine.as_ref());
        error!(strategies = %locator.selector_string(), "No dropdown trigger found");
        return Err(FillError::TriggerNotFound(format!(
            "{} (tried {})",
            dropdown.name,
            locator.selector_string()
        )));
    };
    debug!(trigger = ?trigger.snapshot(), "Dropdown trigger located");

    open_popup(&trigger)?;

    let observed = match dropdown.discovery {
        Discovery::Polling { attempts, backoff } => {
            let attempts = attempts.max(1);
            let mut observed = Vec::new();
            for attempt in 1..=attempts {
                let options = first_non_empty(engine.as_ref(), &dropdown.options)?;
                debug!(attempt, found = options.len(), "Looked for dropdown options");
                if let Some(option) = find_match(&options, desired, policy) {
                    return commit(dropdown, &trigger, &option).await;
                }
                observed = option_texts(&options);
                if !options.is_empty() {
                    warn!(attempt, available = ?observed, "No option matches {:?}", desired);
                }
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
            observed
        }
        Discovery::Settled { wait } => {
            tokio::time::sleep(wait).await;
            let observed = option_texts(&union_of(engine.as_ref(), &dropdown.options)?);
            debug!(available = ?observed, "Dropdown options after settle");
            for selector in &dropdown.options {
                let options = engine.query_all(selector)?;
                if let Some(option) = find_match(&options, desired, policy) {
                    return commit(dropdown, &trigger, &option).await;
                }
            }
            warn!(available = ?observed, "No option matches {:?}", desired);
            observed
        }
    };

    Err(FillError::OptionNotFound {
        desired: desired.to_string(),
        observed,
    })
}

/// Some widgets open on `click`, others only on the lower-level `mousedown`.
/// Send both and let discovery find out which worked.
fn open_popup(trigger: &PageElement) -> Result<(), FillError> {
    trigger.click()?;
    trigger.dispatch_event(DomEvent::MouseDown)
}

fn find_match(options: &[PageElement], desired: &str, policy: MatchPolicy) -> Option<PageElement> {
    options
        .iter()
        .find(|option| policy.matches(&option.text(), desired))
        .cloned()
}

/// Click the option, then hold for the widget's settle time. Closing the
/// popup is left to the widget.
async fn commit(
    dropdown: &DropdownSpec,
    trigger: &PageElement,
    option: &PageElement,
) -> Result<String, FillError> {
    let label = option.text();
    option.click()?;
    info!(option = %label, "Dropdown option selected");
    if !dropdown.settle_after.is_zero() {
        tokio::time::sleep(dropdown.settle_after).await;
    }
    debug!(current = ?trigger.snapshot(), "Trigger after selection");
    Ok(format!("{} selected: {}", dropdown.name, label))
}

fn option_texts(options: &[PageElement]) -> Vec<String> {
    options.iter().map(PageElement::text).collect()
}

/// A missing trigger almost always means the form markup changed; dump what
/// is there so the locators can be fixed.
fn log_comboboxes(engine: &dyn PageEngine) {
    match engine.query_all(&Selector::role("combobox")) {
        Ok(all) => {
            let snapshots: Vec<ElementSnapshot> = all.iter().map(ElementSnapshot::from).collect();
            debug!(total = snapshots.len(), comboboxes = ?snapshots, "Comboboxes on page");
        }
        Err(e) => debug!("Could not list comboboxes: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FormLayout;
    use crate::platforms::memory::{ComboBox, Interaction, MemoryPage, OpenOn, OptionMarkup};
    use std::time::Duration;
    use tokio::time::Instant;

    fn tourist_type() -> DropdownSpec {
        FormLayout::tourist_registration().dropdowns[0].clone()
    }

    fn engine(page: &MemoryPage) -> Arc<dyn PageEngine> {
        Arc::new(page.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn selects_ignoring_case_and_padding() {
        let page = MemoryPage::new();
        let trigger = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]));

        let message = select_option(&engine(&page), &tourist_type(), "foreign", MatchPolicy::default())
            .await
            .unwrap();

        assert_eq!(message, "Tourist Type selected: Foreign");
        assert_eq!(page.text_of(trigger), "Foreign");
        assert_eq!(
            &page.interactions(trigger)[..2],
            &[Interaction::Click, Interaction::Event(DomEvent::MouseDown)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn case_sensitive_override_reports_what_it_saw() {
        let page = MemoryPage::new();
        let trigger = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]));
        let mut dropdown = tourist_type();
        dropdown.match_policy = Some(MatchPolicy::CaseSensitive);

        let err = select_option(&engine(&page), &dropdown, "foreign", MatchPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FillError::OptionNotFound {
                desired: "foreign".to_string(),
                observed: vec!["Domestic".to_string(), "Foreign".to_string()],
            }
        );
        assert_eq!(page.text_of(trigger), "");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_four_looks() {
        let page = MemoryPage::new();
        page.add_combobox(ComboBox::new(["Domestic"]).never_opens());
        let start = Instant::now();

        let err = select_option(&engine(&page), &tourist_type(), "Domestic", MatchPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FillError::OptionNotFound {
                desired: "Domestic".to_string(),
                observed: vec![],
            }
        );
        // Three backoffs between four attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_popup_is_caught_by_a_later_attempt() {
        let page = MemoryPage::new();
        let trigger = page.add_combobox(
            ComboBox::new(["Domestic", "Foreign"])
                .open_on(OpenOn::Click)
                .open_delay(Duration::from_millis(1200)),
        );

        select_option(&engine(&page), &tourist_type(), "Domestic", MatchPolicy::default())
            .await
            .unwrap();
        assert_eq!(page.text_of(trigger), "Domestic");
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_structural_option_selectors() {
        let page = MemoryPage::new();
        let trigger = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]).markup(OptionMarkup::PlainList));

        select_option(&engine(&page), &tourist_type(), "Foreign", MatchPolicy::default())
            .await
            .unwrap();
        assert_eq!(page.text_of(trigger), "Foreign");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_trigger_fails_without_waiting() {
        let page = MemoryPage::new();
        page.add_text_input("Enter Full name");
        let start = Instant::now();

        let err = select_option(&engine(&page), &tourist_type(), "Domestic", MatchPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FillError::TriggerNotFound(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(page.interaction_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_discovery_picks_the_nth_widget() {
        let page = MemoryPage::new();
        page.add_combobox(ComboBox::new(["Domestic"]));
        let proof = page.add_combobox(
            ComboBox::new(["Passport", "Aadhaar Card"]).open_delay(Duration::from_millis(800)),
        );
        let dropdown = FormLayout::tourist_registration().dropdowns[1].clone();
        let start = Instant::now();

        let message = select_option(&engine(&page), &dropdown, "aadhaar card", MatchPolicy::default())
            .await
            .unwrap();

        assert_eq!(message, "Identity Proof selected: Aadhaar Card");
        assert_eq!(page.text_of(proof), "Aadhaar Card");
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn settled_discovery_does_not_look_twice() {
        let page = MemoryPage::new();
        page.add_combobox(ComboBox::new(["Domestic"]));
        page.add_combobox(ComboBox::new(["Passport"]).open_delay(Duration::from_millis(1500)));
        let dropdown = FormLayout::tourist_registration().dropdowns[1].clone();

        let err = select_option(&engine(&page), &dropdown, "Passport", MatchPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FillError::OptionNotFound { observed, .. } if observed.is_empty()));
    }
}
