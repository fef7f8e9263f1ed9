//! Spreadsheet-driven web form filling
//!
//! Rows of a workbook become [`Record`]s. A [`FillOrchestrator`] walks them one
//! fill at a time, handing each to a page-side [`FormOperator`] that types the
//! text fields and works the custom dropdown widgets the way a user would:
//! open the popup, wait for it to render, click the matching option.
//!
//! Pages are reached through the [`PageEngine`] trait; [`MemoryPage`] is an
//! in-memory implementation used for dry runs and tests.

pub mod bridge;
pub mod config;
pub mod dropdown;
pub mod element;
pub mod errors;
pub mod form;
pub mod layout;
pub mod locator;
pub mod orchestrator;
pub mod platforms;
pub mod protocol;
pub mod records;
pub mod selector;
pub mod store;
#[cfg(test)]
mod tests;

pub use bridge::{InProcessTab, TabTarget};
pub use config::{FillerConfig, MatchPolicy};
pub use dropdown::select_option;
pub use element::{DomEvent, ElementSnapshot, PageElement, PageElementImpl};
pub use errors::FillError;
pub use form::{FillReport, FormOperator};
pub use layout::{Discovery, DropdownSpec, FormLayout, TextField};
pub use locator::{Locator, LocatorStrategy};
pub use orchestrator::{status_message, FillOrchestrator, FillOutcome, RecordPreview};
pub use platforms::memory::MemoryPage;
pub use platforms::PageEngine;
pub use protocol::{OperatorRequest, OperatorResponse};
pub use records::{parse_workbook, read_workbook, Record};
pub use selector::Selector;
pub use store::{JsonFileStore, MemoryStore, PersistedState, RecordSet, Settings, StateStore};
