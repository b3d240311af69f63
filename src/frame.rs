//! Tabular data passed between pipeline stages
//!
//! A [`Frame`] is an ordered list of column names plus rows of JSON cells.
//! [`Dataset`] is what a transformation hands to a loader: a single frame,
//! several labeled frames, or a plain list of records.

use eyre::{Result, bail};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// A single row keyed by column name, in column order
pub type Record = Map<String, Value>;

/// Rectangular table of JSON cells
///
/// `Value::Null` marks a missing value. Every row holds exactly
/// `columns().len()` cells.
///
/// # Example
/// ```
/// use tabular_etl::Frame;
/// use serde_json::json;
///
/// let mut frame = Frame::new(vec!["a".to_string(), "b".to_string()]);
/// frame.push_row(vec![json!("1"), json!("x")]).unwrap();
///
/// assert_eq!(frame.len(), 1);
/// assert_eq!(frame.get(0, "b"), Some(&json!("x")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Create an empty frame with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a frame from columns and rows, checking row widths
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Build a frame out of records
    ///
    /// Columns are the union of all keys, in order of first appearance.
    /// Keys missing from a record become `Null`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let records: Vec<&Record> = records.into_iter().collect();
        let mut columns: IndexMap<String, ()> = IndexMap::new();
        for record in &records {
            for key in record.keys() {
                columns.entry(key.clone()).or_default();
            }
        }

        let columns: Vec<String> = columns.into_keys().collect();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Append a row
    ///
    /// # Errors
    /// Returns an error if the row width differs from the column count
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "Row has {} cells, expected {} ({})",
                row.len(),
                self.columns.len(),
                self.columns.join(", ")
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in column `column`
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Convert one row into a record
    pub fn record(&self, row: usize) -> Option<Record> {
        self.rows.get(row).map(|cells| self.zip_row(cells))
    }

    /// Iterate rows as records
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows.iter().map(|cells| self.zip_row(cells))
    }

    fn zip_row(&self, cells: &[Value]) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(cells.iter().cloned())
            .collect()
    }

    /// Rows as a JSON array of objects
    pub fn to_json_records(&self) -> Value {
        Value::Array(self.records().map(Value::Object).collect())
    }

    /// Keep only rows for which `keep` returns true
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Value]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Remove a column by name, returning whether it existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }
}

/// Render a cell as plain text, the way it is written to delimited files
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Output of a transformation
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    /// A single table, stored under the loader's label
    Frame(Frame),
    /// Several tables keyed by label
    Labeled(IndexMap<String, Frame>),
    /// A list of JSON values, expected to be objects
    Records(Vec<Value>),
}

impl Dataset {
    /// Human readable name of the shape, used in error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Labeled(_) => "labeled frames",
            Self::Records(items) if items.is_empty() => "empty record list",
            Self::Records(items) if items.iter().all(Value::is_object) => "record list",
            Self::Records(_) => "list of non-object values",
        }
    }

    /// Total number of rows across all frames
    pub fn row_count(&self) -> usize {
        match self {
            Self::Frame(frame) => frame.len(),
            Self::Labeled(frames) => frames.values().map(Frame::len).sum(),
            Self::Records(items) => items.len(),
        }
    }

    /// Normalize to a label → frame mapping
    ///
    /// A bare frame goes under `label`, a mapping is used as is and a
    /// non-empty list of objects becomes one frame under `label`.
    ///
    /// # Errors
    /// Returns an error naming the shape when the records are empty or not
    /// all objects.
    pub fn labeled(&self, label: &str) -> Result<IndexMap<String, Cow<'_, Frame>>> {
        let mut out = IndexMap::new();
        match self {
            Self::Frame(frame) => {
                out.insert(label.to_string(), Cow::Borrowed(frame));
            }
            Self::Labeled(frames) => {
                for (name, frame) in frames {
                    out.insert(name.clone(), Cow::Borrowed(frame));
                }
            }
            Self::Records(_) => {
                out.insert(label.to_string(), Cow::Owned(self.records_frame()?));
            }
        }
        Ok(out)
    }

    /// Normalize to a single frame
    ///
    /// # Errors
    /// Returns an error naming the shape for mappings holding more or fewer
    /// than one frame and for invalid record lists.
    pub fn single(&self) -> Result<Cow<'_, Frame>> {
        match self {
            Self::Frame(frame) => Ok(Cow::Borrowed(frame)),
            Self::Labeled(frames) if frames.len() == 1 => match frames.values().next() {
                Some(frame) => Ok(Cow::Borrowed(frame)),
                None => bail!("Could not build a frame out of processed data of type {}", self.shape()),
            },
            Self::Labeled(frames) => bail!(
                "Could not build a single frame out of processed data of type {} ({} labels)",
                self.shape(),
                frames.len()
            ),
            Self::Records(_) => Ok(Cow::Owned(self.records_frame()?)),
        }
    }

    fn records_frame(&self) -> Result<Frame> {
        let Self::Records(items) = self else {
            bail!("Could not build a frame out of processed data of type {}", self.shape());
        };
        if items.is_empty() || !items.iter().all(Value::is_object) {
            bail!(
                "Could not build a frame out of processed data of type {}",
                self.shape()
            );
        }
        Ok(Frame::from_records(items.iter().filter_map(Value::as_object)))
    }
}

impl From<Frame> for Dataset {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

impl From<IndexMap<String, Frame>> for Dataset {
    fn from(frames: IndexMap<String, Frame>) -> Self {
        Self::Labeled(frames)
    }
}

impl From<Vec<Record>> for Dataset {
    fn from(records: Vec<Record>) -> Self {
        Self::Records(records.into_iter().map(Value::Object).collect())
    }
}
