//! Extractor trait for data extraction from various sources

use super::EtlContext;
use crate::Frame;
use eyre::Result;

/// Extractor trait for extracting a table from a source
///
/// Implementors define how to read a [`Frame`] out of sources like:
/// - Delimited text or spreadsheet files, plain or zipped
/// - SQL databases and SPARQL endpoints
/// - Scraped HTML pages
///
/// # Example
/// ```no_run
/// use tabular_etl::Frame;
/// use tabular_etl::etl::{EtlContext, Extractor};
/// use eyre::Result;
///
/// struct StaticExtractor;
///
/// impl Extractor for StaticExtractor {
///     async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
///         ctx.debug("Returning an empty frame");
///         Ok(Frame::default())
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    /// Extract one table from the source
    ///
    /// # Errors
    /// Returns an error if extraction fails (network, I/O, parsing, etc.)
    fn extract(&self, ctx: &EtlContext) -> impl std::future::Future<Output = Result<Frame>> + Send;
}
