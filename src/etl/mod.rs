//! Core ETL (Extract, Transform, Load) abstractions
//!
//! This module provides the three stage traits, the logging context handed
//! to every stage and the [`Pipeline`] that sequences them.

mod context;
mod extract;
mod load;
mod pipeline;
mod transform;

pub use context::EtlContext;
pub use extract::Extractor;
pub use load::Loader;
pub use pipeline::Pipeline;
pub use transform::{FnTransformation, IdentityTransformation, Transformation, from_fn};
