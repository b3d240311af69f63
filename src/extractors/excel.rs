//! Spreadsheet extractors, plain and zipped

use super::archive::{EntryMatcher, read_matching_entry};
use super::options::TableOptions;
use super::source::{Source, http_client};
use crate::Frame;
use crate::etl::{EtlContext, Extractor};
use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Worksheet to read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

/// Options for reading spreadsheets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelOptions {
    /// Sheet by position or name, defaults to the first one
    pub sheet: SheetSelector,
    #[serde(flatten)]
    pub table: TableOptions,
}

impl ExcelOptions {
    pub fn sheet(mut self, sheet: SheetSelector) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn table(mut self, table: TableOptions) -> Self {
        self.table = table;
        self
    }

    /// Parse an xls/xlsx/ods workbook into a frame
    ///
    /// # Errors
    /// Returns an error if the workbook cannot be opened, the sheet does not
    /// exist, or shaping fails.
    pub fn parse(&self, bytes: Vec<u8>) -> Result<Frame> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .with_context(|| "Failed to open workbook")?;

        let range = match &self.sheet {
            SheetSelector::Index(n) => workbook
                .worksheet_range_at(*n)
                .ok_or_else(|| eyre!("Workbook has no sheet at position {}", n))?
                .with_context(|| format!("Failed to read sheet {}", n))?,
            SheetSelector::Name(name) => workbook
                .worksheet_range(name)
                .with_context(|| format!("Failed to read sheet '{}'", name))?,
        };

        self.table.shape(range_to_grid(&range))
    }
}

/// Render a cell range as text, anchored at cell A1
fn range_to_grid(range: &Range<Data>) -> Vec<Vec<String>> {
    let (top, left) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<String>> = (0..top).map(|_| Vec::new()).collect();

    for row in range.rows() {
        let mut cells: Vec<String> = (0..left).map(|_| String::new()).collect();
        cells.extend(row.iter().map(cell_to_text));
        grid.push(cells);
    }
    grid
}

/// Text of a single cell; serial dates become `%Y-%m-%d %H:%M:%S`
fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(date) => match date.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => date.to_string(),
        },
        other => other.to_string(),
    }
}

/// Extractor for spreadsheet files, local or remote
#[derive(Debug, Clone)]
pub struct ExcelExtractor {
    source: String,
    options: ExcelOptions,
    verify_tls: bool,
}

impl ExcelExtractor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            options: ExcelOptions::default(),
            verify_tls: true,
        }
    }

    pub fn with_options(mut self, options: ExcelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

impl Extractor for ExcelExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let source = Source::parse(&self.source)?;
        ctx.debug(format_args!("Reading workbook from {}", source));

        let bytes = source.fetch(&http_client(self.verify_tls)?).await?;
        self.options
            .parse(bytes)
            .with_context(|| format!("Failed to parse workbook from {}", source))
    }
}

/// Extractor for a spreadsheet inside a zip archive
///
/// The archive entry is chosen by a required path fragment.
///
/// # Example
/// ```no_run
/// use tabular_etl::extractors::ZipExcelExtractor;
/// use tabular_etl::etl::{EtlContext, Extractor};
///
/// # async fn example() -> eyre::Result<()> {
/// let extractor = ZipExcelExtractor::new(
///     "https://example.org/amministratori.zip",
///     "comunali.xlsx",
/// );
/// let frame = extractor.extract(&EtlContext::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ZipExcelExtractor {
    source: String,
    entry: String,
    options: ExcelOptions,
    verify_tls: bool,
}

impl ZipExcelExtractor {
    pub fn new(source: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry: entry.into(),
            options: ExcelOptions::default(),
            verify_tls: true,
        }
    }

    pub fn with_options(mut self, options: ExcelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

impl Extractor for ZipExcelExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let source = Source::parse(&self.source)?;
        ctx.debug(format_args!("Fetching zipped workbook from {}", source));

        let bytes = source.fetch(&http_client(self.verify_tls)?).await?;
        let matcher = EntryMatcher::Contains(self.entry.clone());
        let (entry, content) = read_matching_entry(bytes, &matcher, &self.source)?;
        ctx.info(format_args!("Parsing {} from {}", entry, source));

        self.options
            .parse(content)
            .with_context(|| format!("Failed to parse {} from {}", entry, source))
    }
}
