//! Persisted filler state: the loaded records, the cursor, and user settings
//!
//! The store is an explicit service handed to whoever needs the state. Nothing
//! reads it ambiently.

use crate::errors::FillError;
use crate::records::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// User settings kept alongside the records
///
/// These are persisted and round-tripped but not consulted by the fill logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_advance: bool,
    pub fill_delay_ms: u64,
    pub retry_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_advance: true,
            fill_delay_ms: 500,
            retry_attempts: 3,
        }
    }
}

/// Everything that survives a restart
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub records: Option<Vec<Record>>,
    pub cursor: usize,
    pub settings: Settings,
}

impl PersistedState {
    /// The records and cursor as a [`RecordSet`], if a spreadsheet is loaded
    pub fn record_set(&self) -> Option<RecordSet> {
        self.records
            .as_ref()
            .map(|records| RecordSet::from_parts(records.clone(), self.cursor))
    }

    /// Swap in a freshly parsed spreadsheet; the cursor starts over
    pub fn replace_records(&mut self, records: Vec<Record>) {
        self.records = Some(records);
        self.cursor = 0;
    }
}

/// Ordered records plus a cursor with `0 <= cursor <= len`
///
/// `cursor == len` means every record has been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
    cursor: usize,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records, cursor: 0 }
    }

    /// Rebuild from persisted parts, clamping a cursor that points past the end
    pub fn from_parts(records: Vec<Record>, cursor: usize) -> Self {
        if cursor > records.len() {
            warn!(
                cursor,
                len = records.len(),
                "Persisted cursor past end of records, clamping"
            );
        }
        let cursor = cursor.min(records.len());
        Self { records, cursor }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.records.len()
    }

    pub fn current(&self) -> Option<&Record> {
        self.records.get(self.cursor)
    }

    /// Move to the next record. Never goes past `len`.
    pub fn advance(&mut self) -> usize {
        self.cursor = (self.cursor + 1).min(self.records.len());
        self.cursor
    }
}

/// Load/save access to the persisted state
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<PersistedState, FillError>;
    async fn save(&self, state: &PersistedState) -> Result<(), FillError>;
}

/// State kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<PersistedState, FillError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), FillError> {
        *self.state.lock().await = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// State kept in a single JSON file
///
/// Writes go to a sibling temp file that is then renamed over the existing one, so
/// a crash mid-write leaves the previous state intact. A missing file loads as
/// the default state.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<PersistedState, FillError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file yet, starting empty");
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(FillError::Storage(format!("read failed: {e}"))),
        };
        serde_json::from_str(&text)
            .map_err(|e| FillError::Storage(format!("corrupt state file: {e}")))
    }

    #[instrument(level = "debug", skip(self, state), fields(path = %self.path.display()))]
    async fn save(&self, state: &PersistedState) -> Result<(), FillError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| FillError::Storage(format!("serialize failed: {e}")))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FillError::Storage(format!("create dir failed: {e}")))?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| FillError::Storage(format!("write failed: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| FillError::Storage(format!("rename failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| [("Full Name", format!("person {i}"))].into_iter().collect())
            .collect()
    }

    #[test]
    fn advance_saturates_at_len() {
        let mut set = RecordSet::new(records(2));
        assert_eq!(set.advance(), 1);
        assert_eq!(set.advance(), 2);
        assert!(set.is_exhausted());
        assert_eq!(set.advance(), 2);
        assert!(set.current().is_none());
    }

    #[test]
    fn corrupt_cursor_is_clamped() {
        let set = RecordSet::from_parts(records(3), 10);
        assert_eq!(set.cursor(), 3);
    }

    #[test]
    fn replacing_records_resets_cursor_and_keeps_settings() {
        let mut state = PersistedState {
            records: Some(records(3)),
            cursor: 2,
            settings: Settings {
                auto_advance: false,
                ..Settings::default()
            },
        };
        state.replace_records(records(5));
        assert_eq!(state.cursor, 0);
        assert_eq!(state.record_set().unwrap().len(), 5);
        assert!(!state.settings.auto_advance);
    }

    #[test]
    fn settings_use_camel_case_keys() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"autoAdvance": true, "fillDelayMs": 500, "retryAttempts": 3})
        );
        let state: PersistedState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, PersistedState::default());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        assert_eq!(store.load().await.unwrap(), PersistedState::default());

        let mut state = PersistedState::default();
        state.replace_records(records(2));
        state.cursor = 1;
        store.save(&state).await.unwrap();

        let reopened = JsonFileStore::new(store.path());
        assert_eq!(reopened.load().await.unwrap(), state);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, FillError::Storage(_)));
    }
}
