//! Split a frame into labeled frames by the value of one column

use crate::etl::{EtlContext, Transformation};
use crate::frame::cell_to_string;
use crate::{Dataset, Frame};
use eyre::{Result, eyre};
use indexmap::IndexMap;
use serde_json::Value;

/// Groups rows by the value of a column
///
/// Each distinct value becomes a label, in order of first appearance; null
/// cells go under `missing_label`. Any other value, the empty string
/// included, is used as its own label, so a value equal to `missing_label`
/// shares the group of the null cells. The grouping column is kept unless
/// `drop_key` is set.
///
/// # Example
/// ```
/// use tabular_etl::Frame;
/// use tabular_etl::etl::{EtlContext, Transformation};
/// use tabular_etl::transform::Partition;
/// use serde_json::json;
///
/// let frame = Frame::from_rows(
///     vec!["regione".into(), "comune".into()],
///     vec![
///         vec![json!("Lazio"), json!("Roma")],
///         vec![json!("Lombardia"), json!("Milano")],
///         vec![json!("Lazio"), json!("Latina")],
///     ],
/// )?;
///
/// let output = Partition::new("regione").transform(&EtlContext::new(), &frame)?;
/// let frames = output.labeled("unused")?;
/// assert_eq!(frames.keys().collect::<Vec<_>>(), ["Lazio", "Lombardia"]);
/// assert_eq!(frames["Lazio"].len(), 2);
/// # Ok::<(), eyre::Report>(())
/// ```
#[derive(Debug, Clone)]
pub struct Partition {
    column: String,
    drop_key: bool,
    missing_label: String,
}

impl Partition {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            drop_key: false,
            missing_label: "missing".to_string(),
        }
    }

    pub fn drop_key(mut self, drop_key: bool) -> Self {
        self.drop_key = drop_key;
        self
    }

    pub fn missing_label(mut self, label: impl Into<String>) -> Self {
        self.missing_label = label.into();
        self
    }
}

impl Transformation for Partition {
    fn transform(&self, ctx: &EtlContext, original: &Frame) -> Result<Dataset> {
        let key = original
            .column_index(&self.column)
            .ok_or_else(|| eyre!("Cannot partition on missing column {}", self.column))?;

        let mut groups: IndexMap<String, Frame> = IndexMap::new();
        for row in original.rows() {
            let label = match &row[key] {
                Value::Null => self.missing_label.clone(),
                value => cell_to_string(value),
            };
            groups
                .entry(label)
                .or_insert_with(|| Frame::new(original.columns().to_vec()))
                .push_row(row.clone())?;
        }

        if self.drop_key {
            for frame in groups.values_mut() {
                frame.drop_column(&self.column);
            }
        }

        ctx.debug(format_args!(
            "Split {} rows into {} groups by {}",
            original.len(),
            groups.len(),
            self.column
        ));
        Ok(Dataset::Labeled(groups))
    }
}
