//! Tabular ETL
//!
//! A small extract-transform-load framework for tabular data: an
//! [`Extractor`] reads a [`Frame`], a [`Transformation`] turns it into a
//! [`Dataset`] and a [`Loader`] persists it, all wired by a [`Pipeline`].

pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod etl;
pub mod extractors;
pub mod frame;
pub mod loaders;
pub mod transform;

// Re-exports for convenience
pub use client::{Auth, SearchClient};
pub use etl::{EtlContext, Extractor, IdentityTransformation, Loader, Pipeline, Transformation};
pub use frame::{Dataset, Frame, Record};
