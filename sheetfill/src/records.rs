//! Records read from the spreadsheet and the workbook reader that produces them

use crate::errors::FillError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// One spreadsheet row: field label to field value
///
/// There is no schema. Labels are whatever the header row says and are matched
/// later against the form layout. Serializes as a flat JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for a label, empty strings included
    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    /// Value for a label if the record actually supplies one
    ///
    /// Missing and empty values both mean "no value for this field".
    pub fn value(&self, label: &str) -> Option<&str> {
        self.get(label).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.0.insert(label.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Parse a workbook held in memory
///
/// Only the first sheet is read. Its first non-empty row is the header and
/// names the fields; every following row with at least one value becomes a
/// [`Record`]. Any format calamine recognises is accepted.
#[instrument(level = "debug", skip(bytes), fields(bytes = bytes.len()))]
pub fn parse_workbook(bytes: &[u8]) -> Result<Vec<Record>, FillError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| FillError::ParseFailure(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    let first = sheet_names
        .first()
        .ok_or_else(|| FillError::ParseFailure("workbook has no sheets".to_string()))?;
    if sheet_names.len() > 1 {
        debug!(sheet = %first, ignored = sheet_names.len() - 1, "Reading first sheet only");
    }
    let range = workbook
        .worksheet_range(first)
        .map_err(|e| FillError::ParseFailure(format!("sheet '{first}': {e}")))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers = header_labels(header_row);
    if headers.iter().all(Option::is_none) {
        return Err(FillError::ParseFailure(format!(
            "sheet '{first}' has no header row"
        )));
    }

    let records: Vec<Record> = rows
        .map(|row| {
            headers
                .iter()
                .zip(row)
                .filter_map(|(label, cell)| Some((label.clone()?, cell_text(cell)?)))
                .collect::<Record>()
        })
        .filter(|record| !record.is_empty())
        .collect();

    info!(sheet = %first, records = records.len(), "Parsed workbook");
    Ok(records)
}

/// Read and parse a workbook from disk
pub fn read_workbook(path: impl AsRef<Path>) -> Result<Vec<Record>, FillError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| FillError::ParseFailure(format!("{}: {e}", path.display())))?;
    parse_workbook(&bytes)
}

/// Header labels by column. Blank headers drop their column; repeated headers
/// get `_1`, `_2`, ... suffixes so no column silently overwrites another.
fn header_labels(row: &[Data]) -> Vec<Option<String>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    row.iter()
        .map(|cell| {
            let label = cell_text(cell)?.trim().to_string();
            if label.is_empty() {
                return None;
            }
            let count = seen.entry(label.clone()).or_insert(0);
            let unique = if *count == 0 {
                label
            } else {
                warn!(%label, "Duplicate column header");
                format!("{label}_{count}")
            };
            *count += 1;
            Some(unique)
        })
        .collect()
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        // Phone and ID numbers are stored as floats; print them without a fraction
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
