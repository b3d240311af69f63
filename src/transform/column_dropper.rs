//! Column dropper transformation
//!
//! Removes named columns from a frame, typically identifiers or bookkeeping
//! fields that should not reach the destination.

use crate::etl::{EtlContext, Transformation};
use crate::{Dataset, Frame};
use eyre::Result;

/// Transformation that drops the given columns
///
/// Columns missing from the frame are ignored.
///
/// # Example
/// ```
/// use tabular_etl::Frame;
/// use tabular_etl::etl::{EtlContext, Transformation};
/// use tabular_etl::transform::ColumnDropper;
/// use serde_json::json;
///
/// let frame = Frame::from_rows(
///     vec!["id".into(), "created_at".into(), "title".into()],
///     vec![vec![json!(1), json!("2024-01-01"), json!("Roma")]],
/// )?;
///
/// let dropper = ColumnDropper::new(["created_at"]);
/// let output = dropper.transform(&EtlContext::new(), &frame)?;
/// assert_eq!(output.single()?.columns(), &["id", "title"]);
/// # Ok::<(), eyre::Report>(())
/// ```
#[derive(Debug, Clone)]
pub struct ColumnDropper {
    columns: Vec<String>,
}

impl ColumnDropper {
    /// Create a new column dropper with the columns to remove
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformation for ColumnDropper {
    fn transform(&self, ctx: &EtlContext, original: &Frame) -> Result<Dataset> {
        let mut frame = original.clone();
        for column in &self.columns {
            if frame.drop_column(column) {
                ctx.debug(format_args!("Dropped column {}", column));
            }
        }
        Ok(Dataset::Frame(frame))
    }
}
