//! Drives one fill cycle: pick the current record, make sure the tab has an
//! operator, hand the record over, advance the cursor

use crate::bridge::TabTarget;
use crate::config::FillerConfig;
use crate::errors::FillError;
use crate::form::FillReport;
use crate::protocol::OperatorRequest;
use crate::records::{parse_workbook, Record};
use crate::store::StateStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Where a fill cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPhase {
    Idle,
    LocatingRecord,
    EnsuringInjection,
    Filling,
    Advanced,
    Exhausted,
    Failed,
}

/// How a fill cycle ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Record `filled` (1-based) went in and record `next` is up
    Advanced {
        filled: usize,
        next: usize,
        report: FillReport,
    },
    /// Record `filled` was the last one
    Exhausted { filled: usize, report: FillReport },
    /// Nothing loaded, or every record already processed
    NoDataAvailable,
}

/// The record the next fill will use, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPreview {
    /// 1-based
    pub position: usize,
    pub total: usize,
    pub record: Record,
}

impl RecordPreview {
    pub fn title(&self) -> String {
        format!("Current Record ({}/{})", self.position, self.total)
    }
}

/// Turn a fill result into the one-line status shown to the user
pub fn status_message(result: &Result<FillOutcome, FillError>) -> String {
    match result {
        Ok(FillOutcome::Advanced { filled, .. }) => format!("Form filled for record {filled}"),
        Ok(FillOutcome::Exhausted { .. }) => "All records processed!".to_string(),
        Ok(FillOutcome::NoDataAvailable) => "No data available to fill".to_string(),
        Err(e) => format!("Error: {e}"),
    }
}

/// Same, for a spreadsheet load
pub fn load_status_message(result: &Result<usize, FillError>) -> String {
    match result {
        Ok(count) => format!("Successfully loaded {count} records"),
        Err(e) => format!("Error: {e}"),
    }
}

pub struct FillOrchestrator {
    store: Arc<dyn StateStore>,
    tab: Arc<dyn TabTarget>,
    config: FillerConfig,
    load_failed: AtomicBool,
}

impl FillOrchestrator {
    pub fn new(store: Arc<dyn StateStore>, tab: Arc<dyn TabTarget>, config: FillerConfig) -> Self {
        Self {
            store,
            tab,
            config,
            load_failed: AtomicBool::new(false),
        }
    }

    /// Parse a workbook and make its rows the record set, cursor at the start
    ///
    /// Returns the number of records. Settings are left alone.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn load_spreadsheet(&self, bytes: &[u8]) -> Result<usize, FillError> {
        let result = self.replace_records(bytes).await;
        self.load_failed.store(result.is_err(), Ordering::SeqCst);
        match &result {
            Ok(count) => info!(count, "Successfully loaded {} records", count),
            Err(e) => error!("Error processing file: {}", e),
        }
        result
    }

    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, FillError> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => self.load_spreadsheet(&bytes).await,
            Err(e) => {
                self.load_failed.store(true, Ordering::SeqCst);
                Err(FillError::ParseFailure(format!("{}: {e}", path.display())))
            }
        }
    }

    async fn replace_records(&self, bytes: &[u8]) -> Result<usize, FillError> {
        let records = parse_workbook(bytes)?;
        if records.is_empty() {
            return Err(FillError::ParseFailure(
                "No data found in spreadsheet".to_string(),
            ));
        }
        let count = records.len();
        let mut state = self.store.load().await?;
        state.replace_records(records);
        self.store.save(&state).await?;
        Ok(count)
    }

    /// Whether filling is possible: records are loaded and the last load
    /// attempt did not fail
    pub async fn has_data(&self) -> bool {
        if self.load_failed.load(Ordering::SeqCst) {
            return false;
        }
        match self.store.load().await {
            Ok(state) => state.records.is_some_and(|r| !r.is_empty()),
            Err(e) => {
                warn!("Could not read state: {}", e);
                false
            }
        }
    }

    /// The record the next fill would use
    pub async fn current_record(&self) -> Result<Option<RecordPreview>, FillError> {
        let state = self.store.load().await?;
        Ok(state.record_set().and_then(|set| {
            set.current().map(|record| RecordPreview {
                position: set.cursor() + 1,
                total: set.len(),
                record: record.clone(),
            })
        }))
    }

    /// Run one fill cycle against the tab
    ///
    /// The cursor moves only when the operator reports success. A failure
    /// leaves everything where it was so the same record can be retried.
    /// After a failed load nothing is filled until a load succeeds.
    #[instrument(skip(self))]
    pub async fn fill_current(&self) -> Result<FillOutcome, FillError> {
        let mut phase = FillPhase::Idle;
        let result = self.run_cycle(&mut phase).await;
        if let Err(e) = &result {
            transition(&mut phase, FillPhase::Failed);
            if e.is_operator_error() {
                error!("Operator could not fill the form: {}", e);
            } else {
                error!("Error in fill cycle: {}", e);
            }
        }
        result
    }

    async fn run_cycle(&self, phase: &mut FillPhase) -> Result<FillOutcome, FillError> {
        transition(phase, FillPhase::LocatingRecord);
        if self.load_failed.load(Ordering::SeqCst) {
            info!("Last spreadsheet load failed, filling disabled");
            return Ok(FillOutcome::NoDataAvailable);
        }
        let mut state = self.store.load().await?;
        let Some(mut set) = state.record_set() else {
            info!("No data available to fill");
            return Ok(FillOutcome::NoDataAvailable);
        };
        let Some(record) = set.current().cloned() else {
            info!(len = set.len(), "All records already processed");
            return Ok(FillOutcome::NoDataAvailable);
        };
        let filled = set.cursor() + 1;

        transition(phase, FillPhase::EnsuringInjection);
        self.ensure_operator().await?;

        transition(phase, FillPhase::Filling);
        let timeout = self.config.fill_timeout;
        let request = OperatorRequest::FillForm { data: record };
        let response = tokio::time::timeout(timeout, self.tab.send(request, timeout))
            .await
            .map_err(|_| timed_out(timeout))??;
        let report = response.into_fill_result()?;

        let next = set.advance();
        state.cursor = next;
        self.store.save(&state).await?;
        info!(record = filled, cursor = next, "{}", report.message);

        if set.is_exhausted() {
            transition(phase, FillPhase::Exhausted);
            Ok(FillOutcome::Exhausted { filled, report })
        } else {
            transition(phase, FillPhase::Advanced);
            Ok(FillOutcome::Advanced {
                filled,
                next: next + 1,
                report,
            })
        }
    }

    /// Probe the tab and install the operator only if nobody answers
    async fn ensure_operator(&self) -> Result<(), FillError> {
        if self.ping().await {
            debug!("Operator already present");
            return Ok(());
        }
        info!("Operator not responding, installing");
        self.tab
            .install()
            .await
            .map_err(|e| FillError::InjectionFailed(e.to_string()))?;
        tokio::time::sleep(self.config.injection_settle).await;
        if self.ping().await {
            Ok(())
        } else {
            Err(FillError::InjectionFailed(
                "operator did not respond after install".to_string(),
            ))
        }
    }

    async fn ping(&self) -> bool {
        let timeout = self.config.ping_timeout;
        match tokio::time::timeout(timeout, self.tab.send(OperatorRequest::Ping, timeout)).await {
            Ok(Ok(response)) => response.is_pong(),
            Ok(Err(e)) => {
                debug!("Ping failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Ping timed out");
                false
            }
        }
    }
}

fn transition(phase: &mut FillPhase, next: FillPhase) {
    debug!(from = ?*phase, to = ?next, "Fill phase");
    *phase = next;
}

fn timed_out(timeout: Duration) -> FillError {
    FillError::Timeout(format!(
        "Form filling timed out after {} ms",
        timeout.as_millis()
    ))
}
