//! Loader trait for loading data to destinations

use super::EtlContext;
use crate::Dataset;
use eyre::Result;

/// Loader trait for persisting processed data
///
/// Implementors define how to write a [`Dataset`] to destinations:
/// - Delimited text or JSON files
/// - Search indexes
/// - Database tables
///
/// A loader must accept every [`Dataset`] shape, normalizing it with
/// [`Dataset::labeled`] or [`Dataset::single`].
///
/// # Example
/// ```no_run
/// use tabular_etl::Dataset;
/// use tabular_etl::etl::{EtlContext, Loader};
/// use eyre::Result;
///
/// struct CountingLoader;
///
/// impl Loader for CountingLoader {
///     async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
///         let frame = data.single()?;
///         ctx.info(format_args!("Would load {} rows", frame.len()));
///         Ok(frame.len())
///     }
/// }
/// ```
pub trait Loader: Send + Sync {
    /// Load processed data to the destination
    ///
    /// Returns the number of rows successfully loaded
    ///
    /// # Errors
    /// Returns an error if loading fails (network, I/O, unsupported shape, etc.)
    fn load(
        &self,
        ctx: &EtlContext,
        data: &Dataset,
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
