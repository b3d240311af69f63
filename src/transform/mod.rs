//! Ready-made transformations
//!
//! [`AnyTransformation`] wraps them, together with the identity, for
//! config-driven pipelines.

mod column_dropper;
mod partition;

pub use column_dropper::ColumnDropper;
pub use partition::Partition;

use crate::etl::{EtlContext, IdentityTransformation, Transformation};
use crate::{Dataset, Frame};
use eyre::Result;

/// Any of the built-in transformations
#[derive(Debug, Clone, Default)]
pub enum AnyTransformation {
    #[default]
    Identity,
    DropColumns(ColumnDropper),
    Partition(Partition),
}

impl Transformation for AnyTransformation {
    fn transform(&self, ctx: &EtlContext, original: &Frame) -> Result<Dataset> {
        match self {
            Self::Identity => IdentityTransformation.transform(ctx, original),
            Self::DropColumns(t) => t.transform(ctx, original),
            Self::Partition(t) => t.transform(ctx, original),
        }
    }
}

impl From<ColumnDropper> for AnyTransformation {
    fn from(t: ColumnDropper) -> Self {
        Self::DropColumns(t)
    }
}

impl From<Partition> for AnyTransformation {
    fn from(t: Partition) -> Self {
        Self::Partition(t)
    }
}
