//! Parsing options shared by the delimited-text and spreadsheet extractors
//!
//! Both formats are first read into a grid of raw strings, then shaped into
//! a [`Frame`] by [`TableOptions::shape`]: rows are skipped, the header row
//! is picked, missing values are recognized and cells are typed.

use crate::Frame;
use eyre::{Result, bail, eyre};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Tokens recognized as missing values unless `keep_default_na` is off
pub const DEFAULT_NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "N/A", "NA", "NULL", "NaN", "nan",
];

/// Target type of a column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// Keep the raw text
    #[default]
    Str,
    Int,
    Float,
    Bool,
}

impl Dtype {
    fn cast(self, raw: &str) -> Result<Value> {
        let trimmed = raw.trim();
        match self {
            Self::Str => Ok(Value::String(raw.to_string())),
            Self::Int => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| eyre!("'{}' is not an integer", raw)),
            Self::Float => trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| eyre!("'{}' is not a finite float", raw)),
            Self::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(eyre!("'{}' is not a boolean", raw)),
            },
        }
    }
}

/// Function converting the raw text of a cell into a value
///
/// Converters run before missing-value detection and dtype casting.
#[derive(Clone)]
pub struct Converter(Arc<dyn Fn(&str) -> Result<Value> + Send + Sync>);

impl Converter {
    pub fn new(f: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn convert(&self, raw: &str) -> Result<Value> {
        (self.0)(raw)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Converter(..)")
    }
}

/// How a grid of raw cells becomes a frame
///
/// # Example
/// ```
/// use tabular_etl::extractors::{Dtype, TableOptions};
///
/// let options = TableOptions::default()
///     .skip_rows(1)
///     .dtype("inhabitants", Dtype::Int)
///     .na_values(["-"]);
/// assert_eq!(options.header, Some(0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Row holding the column names, counted after `skip_rows`; `None`
    /// numbers the columns instead
    pub header: Option<usize>,
    /// Rows dropped at the top
    pub skip_rows: usize,
    /// Rows dropped at the bottom
    pub skip_footer: usize,
    /// Per-column type, columns not listed stay text
    pub dtype: HashMap<String, Dtype>,
    /// Per-column converters, taking precedence over `dtype`
    #[serde(skip)]
    pub converters: HashMap<String, Converter>,
    /// Detect missing values at all
    pub na_filter: bool,
    /// Additional missing-value tokens
    pub na_values: Vec<String>,
    /// Also honour [`DEFAULT_NA_VALUES`]
    pub keep_default_na: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            header: Some(0),
            skip_rows: 0,
            skip_footer: 0,
            dtype: HashMap::new(),
            converters: HashMap::new(),
            na_filter: true,
            na_values: Vec::new(),
            keep_default_na: true,
        }
    }
}

impl TableOptions {
    pub fn header(mut self, header: Option<usize>) -> Self {
        self.header = header;
        self
    }

    pub fn skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    pub fn skip_footer(mut self, rows: usize) -> Self {
        self.skip_footer = rows;
        self
    }

    pub fn dtype(mut self, column: impl Into<String>, dtype: Dtype) -> Self {
        self.dtype.insert(column.into(), dtype);
        self
    }

    pub fn converter(mut self, column: impl Into<String>, converter: Converter) -> Self {
        self.converters.insert(column.into(), converter);
        self
    }

    pub fn na_filter(mut self, enabled: bool) -> Self {
        self.na_filter = enabled;
        self
    }

    pub fn na_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.na_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn keep_default_na(mut self, keep: bool) -> Self {
        self.keep_default_na = keep;
        self
    }

    fn na_set(&self) -> HashSet<&str> {
        if !self.na_filter {
            return HashSet::new();
        }
        let mut set: HashSet<&str> = self.na_values.iter().map(String::as_str).collect();
        if self.keep_default_na {
            set.extend(DEFAULT_NA_VALUES.iter().copied());
        }
        set
    }

    /// Shape a grid of raw cells into a frame
    ///
    /// # Errors
    /// Returns an error when a row is wider than the header, or when a cell
    /// fails its dtype cast or converter.
    pub fn shape(&self, grid: Vec<Vec<String>>) -> Result<Frame> {
        let end = grid.len().saturating_sub(self.skip_footer);
        let mut lines = grid
            .into_iter()
            .take(end)
            .skip(self.skip_rows)
            .collect::<Vec<_>>();

        let columns = match self.header {
            Some(h) => {
                if h >= lines.len() {
                    return Ok(Frame::default());
                }
                let names = lines[h].clone();
                lines.drain(..=h);
                header_names(names)
            }
            None => {
                let width = lines.iter().map(Vec::len).max().unwrap_or(0);
                (0..width).map(|i| i.to_string()).collect()
            }
        };

        let na = self.na_set();
        let width = columns.len();
        let mut frame = Frame::new(columns.clone());

        for (n, mut raw_row) in lines.into_iter().enumerate() {
            if raw_row.len() > width {
                bail!(
                    "Row {} has {} fields, expected {}",
                    n + 1,
                    raw_row.len(),
                    width
                );
            }
            raw_row.resize(width, String::new());

            let mut row = Vec::with_capacity(width);
            for (raw, column) in raw_row.iter().zip(&columns) {
                let value = self
                    .cell(raw, column, &na)
                    .map_err(|e| eyre!("Column '{}', row {}: {}", column, n + 1, e))?;
                row.push(value);
            }
            frame.push_row(row)?;
        }

        Ok(frame)
    }

    fn cell(&self, raw: &str, column: &str, na: &HashSet<&str>) -> Result<Value> {
        if let Some(converter) = self.converters.get(column) {
            return converter.convert(raw);
        }
        if na.contains(raw) {
            return Ok(Value::Null);
        }
        self.dtype.get(column).copied().unwrap_or_default().cast(raw)
    }
}

/// Fill blank header cells and disambiguate duplicates
fn header_names(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let name = if name.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name
            };
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            unique
        })
        .collect()
}
