use crate::config::MatchPolicy;
use crate::dropdown::select_option;
use crate::errors::FillError;
use crate::layout::FormLayout;
use crate::platforms::PageEngine;
use crate::records::Record;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What one fill of the page accomplished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillReport {
    /// Labels of the fields that received a value, in fill order
    pub filled_fields: Vec<String>,
    pub message: String,
}

impl FillReport {
    fn new(filled_fields: Vec<String>) -> Self {
        Self {
            message: format!("Fields filled: {}", filled_fields.len()),
            filled_fields,
        }
    }
}

/// Page-side agent that writes one record into the form
pub struct FormOperator {
    engine: Arc<dyn PageEngine>,
    layout: FormLayout,
    match_policy: MatchPolicy,
}

impl FormOperator {
    pub fn new(engine: Arc<dyn PageEngine>, layout: FormLayout, match_policy: MatchPolicy) -> Self {
        Self {
            engine,
            layout,
            match_policy,
        }
    }

    /// Clear the form, then fill text fields and dropdowns from `record`
    ///
    /// Fields the page lacks or the record leaves empty are skipped. The first
    /// dropdown that cannot be operated aborts the fill; anything written
    /// before that point stays on the page.
    #[instrument(skip(self, record), fields(url = ?self.engine.url()))]
    pub async fn fill(&self, record: &Record) -> Result<FillReport, FillError> {
        self.clear()?;

        let mut filled = Vec::new();
        for field in &self.layout.text_fields {
            let Some(value) = record.value(&field.label) else {
                debug!(label = %field.label, "No value, skipping");
                continue;
            };
            match self.engine.query_first(&field.selector)? {
                Some(element) => {
                    element.fill(value)?;
                    filled.push(field.label.clone());
                }
                None => warn!(label = %field.label, selector = %field.selector, "Field not found on page"),
            }
        }

        for dropdown in &self.layout.dropdowns {
            // Let the page re-render after the previous step
            tokio::task::yield_now().await;
            let Some(value) = record.value(&dropdown.label) else {
                debug!(dropdown = %dropdown.name, "No value, skipping");
                continue;
            };
            let message = select_option(&self.engine, dropdown, value, self.match_policy).await?;
            info!("{}", message);
            filled.push(dropdown.label.clone());
        }

        let report = FillReport::new(filled);
        info!(filled = ?report.filled_fields, "{}", report.message);
        Ok(report)
    }

    /// Reset every clearable control so stale values never leak into the next record
    fn clear(&self) -> Result<(), FillError> {
        let controls = self.engine.query_all(&self.layout.clearable)?;
        let mut cleared = 0;
        for control in controls {
            if matches!(control.input_type().as_deref(), Some("submit" | "button")) {
                continue;
            }
            control.fill("")?;
            cleared += 1;
        }
        debug!(cleared, "Cleared form controls");
        Ok(())
    }
}
