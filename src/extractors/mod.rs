//! Extractor implementations
//!
//! Each extractor reads one table out of a source. [`AnyExtractor`] wraps all
//! the built-in ones so that config files can pick one at runtime.

mod archive;
mod csv;
mod excel;
mod html;
mod memory;
mod options;
mod source;
mod sparql;
mod sql;

pub use archive::{EntryMatcher, read_matching_entry};
pub use self::csv::{CsvExtractor, CsvOptions, ZipCsvExtractor};
pub use excel::{ExcelExtractor, ExcelOptions, SheetSelector, ZipExcelExtractor};
pub use html::{FieldSelector, HtmlExtractor, HtmlParser, SelectorParser};
pub use memory::{FrameExtractor, NoOpExtractor};
pub use options::{Converter, DEFAULT_NA_VALUES, Dtype, TableOptions};
pub use source::{Source, http_client};
pub use sparql::{SparqlExtractor, SparqlMethod, results_to_frame};
pub use sql::SqlExtractor;

use crate::Frame;
use crate::etl::{EtlContext, Extractor};
use eyre::Result;

/// Any of the built-in extractors
#[derive(Debug, Clone)]
pub enum AnyExtractor {
    Csv(CsvExtractor),
    ZipCsv(ZipCsvExtractor),
    Excel(ExcelExtractor),
    ZipExcel(ZipExcelExtractor),
    Sql(SqlExtractor),
    Sparql(SparqlExtractor),
    Html(HtmlExtractor<SelectorParser>),
    Frame(FrameExtractor),
    NoOp(NoOpExtractor),
}

impl AnyExtractor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Csv(_) => "csv",
            Self::ZipCsv(_) => "zip_csv",
            Self::Excel(_) => "excel",
            Self::ZipExcel(_) => "zip_excel",
            Self::Sql(_) => "sql",
            Self::Sparql(_) => "sparql",
            Self::Html(_) => "html",
            Self::Frame(_) => "frame",
            Self::NoOp(_) => "noop",
        }
    }
}

impl Extractor for AnyExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        match self {
            Self::Csv(e) => e.extract(ctx).await,
            Self::ZipCsv(e) => e.extract(ctx).await,
            Self::Excel(e) => e.extract(ctx).await,
            Self::ZipExcel(e) => e.extract(ctx).await,
            Self::Sql(e) => e.extract(ctx).await,
            Self::Sparql(e) => e.extract(ctx).await,
            Self::Html(e) => e.extract(ctx).await,
            Self::Frame(e) => e.extract(ctx).await,
            Self::NoOp(e) => e.extract(ctx).await,
        }
    }
}

macro_rules! impl_from_extractor {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AnyExtractor {
                fn from(extractor: $ty) -> Self {
                    Self::$variant(extractor)
                }
            }
        )*
    };
}

impl_from_extractor! {
    Csv => CsvExtractor,
    ZipCsv => ZipCsvExtractor,
    Excel => ExcelExtractor,
    ZipExcel => ZipExcelExtractor,
    Sql => SqlExtractor,
    Sparql => SparqlExtractor,
    Html => HtmlExtractor<SelectorParser>,
    Frame => FrameExtractor,
    NoOp => NoOpExtractor,
}
