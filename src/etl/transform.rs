//! Transformation trait for reshaping extracted data

use super::EtlContext;
use crate::{Dataset, Frame};
use eyre::Result;

/// Transformation trait mapping the extracted table to processed data
///
/// Implementors read the pipeline's original data and produce the
/// processed data handed to the loader:
/// - Column cleanup (dropping or renaming)
/// - Splitting one table into several labeled tables
/// - Any custom reshaping
///
/// # Example
/// ```
/// use tabular_etl::{Dataset, Frame};
/// use tabular_etl::etl::{EtlContext, Transformation};
/// use eyre::Result;
///
/// struct FirstRowOnly;
///
/// impl Transformation for FirstRowOnly {
///     fn transform(&self, _ctx: &EtlContext, original: &Frame) -> Result<Dataset> {
///         let rows = original.rows().iter().take(1).cloned().collect();
///         Ok(Frame::from_rows(original.columns().to_vec(), rows)?.into())
///     }
/// }
///
/// let frame = Frame::new(vec!["a".to_string()]);
/// let out = FirstRowOnly.transform(&EtlContext::new(), &frame).unwrap();
/// assert_eq!(out.row_count(), 0);
/// ```
pub trait Transformation: Send + Sync {
    /// Transform the original data
    ///
    /// # Errors
    /// Returns an error if transformation fails (validation, conversion, etc.)
    fn transform(&self, ctx: &EtlContext, original: &Frame) -> Result<Dataset>;
}

/// Identity transformation that passes the table through unchanged
///
/// This is the transformation used when a pipeline is built without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformation;

impl IdentityTransformation {
    pub fn new() -> Self {
        Self
    }
}

impl Transformation for IdentityTransformation {
    fn transform(&self, _ctx: &EtlContext, original: &Frame) -> Result<Dataset> {
        Ok(Dataset::Frame(original.clone()))
    }
}

/// Transformation backed by a closure
pub struct FnTransformation<F> {
    f: F,
}

impl<F> Transformation for FnTransformation<F>
where
    F: Fn(&EtlContext, &Frame) -> Result<Dataset> + Send + Sync,
{
    fn transform(&self, ctx: &EtlContext, original: &Frame) -> Result<Dataset> {
        (self.f)(ctx, original)
    }
}

/// Wrap a closure as a [`Transformation`]
pub fn from_fn<F>(f: F) -> FnTransformation<F>
where
    F: Fn(&EtlContext, &Frame) -> Result<Dataset> + Send + Sync,
{
    FnTransformation { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Frame {
        Frame::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![json!("1"), json!("x")],
                vec![json!("2"), json!("y")],
                vec![json!("3"), json!(null)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_identity_transformation() {
        let input = sample();
        let output = IdentityTransformation::new()
            .transform(&EtlContext::new(), &input)
            .unwrap();

        let Dataset::Frame(frame) = output else {
            panic!("identity should produce a single frame");
        };
        assert_eq!(frame.len(), input.len());
        assert_eq!(frame.columns(), input.columns());
        assert_eq!(frame.rows(), input.rows());
    }

    #[test]
    fn test_from_fn() {
        let upper = from_fn(|_ctx, frame: &Frame| {
            let columns = frame.columns().iter().map(|c| c.to_uppercase()).collect();
            Ok(Frame::from_rows(columns, frame.rows().to_vec())?.into())
        });

        let output = upper.transform(&EtlContext::new(), &sample()).unwrap();
        let frame = output.single().unwrap();
        assert_eq!(frame.columns(), &["A", "B"]);
    }
}
