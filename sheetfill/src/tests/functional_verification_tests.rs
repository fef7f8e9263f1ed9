//! The default layout operated against a page shaped like the real form

use crate::layout::{GENDER, IDENTITY_PROOF, TOURIST_TYPE};
use crate::platforms::memory::{ComboBox, MemoryPage, NodeId};
use crate::{FillError, FormLayout, FormOperator, MatchPolicy, Record};
use std::sync::Arc;

/// Three selects, the later two mounted only once the first has a value
fn dependent_selects(page: &MemoryPage) -> [NodeId; 3] {
    let tourist = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]));
    let proof = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]).revealed_by(tourist));
    let gender = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]).revealed_by(tourist));
    [tourist, proof, gender]
}

fn lowercase_record() -> Record {
    [
        (TOURIST_TYPE, "foreign"),
        (IDENTITY_PROOF, "foreign"),
        (GENDER, "domestic"),
    ]
    .into_iter()
    .collect()
}

#[tokio::test(start_paused = true)]
async fn default_policy_ignores_case_for_every_dropdown() {
    super::init_tracing();
    let page = MemoryPage::new();
    let [tourist, proof, gender] = dependent_selects(&page);
    let operator = FormOperator::new(
        Arc::new(page.clone()),
        FormLayout::default(),
        MatchPolicy::default(),
    );

    let report = operator.fill(&lowercase_record()).await.unwrap();

    assert_eq!(report.filled_fields, vec![TOURIST_TYPE, IDENTITY_PROOF, GENDER]);
    assert_eq!(page.text_of(tourist), "Foreign");
    assert_eq!(page.text_of(proof), "Foreign");
    assert_eq!(page.text_of(gender), "Domestic");
}

#[tokio::test(start_paused = true)]
async fn case_sensitive_policy_stops_at_the_first_dropdown() {
    super::init_tracing();
    let page = MemoryPage::new();
    let [tourist, proof, _] = dependent_selects(&page);
    let operator = FormOperator::new(
        Arc::new(page.clone()),
        FormLayout::default(),
        MatchPolicy::CaseSensitive,
    );

    let err = operator.fill(&lowercase_record()).await.unwrap_err();

    assert!(matches!(err, FillError::OptionNotFound { ref desired, .. } if desired == "foreign"));
    assert_eq!(page.text_of(tourist), "");
    assert!(!page.is_mounted(proof));
}

#[tokio::test(start_paused = true)]
async fn dependent_select_missing_from_page_is_a_trigger_error() {
    let page = MemoryPage::new();
    page.add_combobox(ComboBox::new(["Domestic", "Foreign"]));
    let operator = FormOperator::new(
        Arc::new(page.clone()),
        FormLayout::default(),
        MatchPolicy::default(),
    );

    let err = operator.fill(&lowercase_record()).await.unwrap_err();
    assert!(matches!(err, FillError::TriggerNotFound(ref what) if what.starts_with("Identity Proof")));
}
