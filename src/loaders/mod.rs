//! Loader implementations
//!
//! Each loader persists a [`Dataset`] and reports how many rows it wrote.
//! [`AnyLoader`] wraps the built-in ones for config-driven pipelines.

mod csv;
mod json;
mod search;
mod sql;

pub use self::csv::CsvLoader;
pub use json::JsonLoader;
pub use search::SearchLoader;
pub use sql::{BulkInsertLoader, FailurePolicy, UpsertLoader};

use crate::Dataset;
use crate::etl::{EtlContext, Loader};
use eyre::Result;

/// Any of the built-in loaders
#[derive(Debug, Clone)]
pub enum AnyLoader {
    Csv(CsvLoader),
    Json(JsonLoader),
    Search(SearchLoader),
    BulkInsert(BulkInsertLoader),
    Upsert(UpsertLoader),
}

impl AnyLoader {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Csv(_) => "csv",
            Self::Json(_) => "json",
            Self::Search(_) => "search",
            Self::BulkInsert(_) => "bulk_insert",
            Self::Upsert(_) => "upsert",
        }
    }
}

impl Loader for AnyLoader {
    async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
        match self {
            Self::Csv(l) => l.load(ctx, data).await,
            Self::Json(l) => l.load(ctx, data).await,
            Self::Search(l) => l.load(ctx, data).await,
            Self::BulkInsert(l) => l.load(ctx, data).await,
            Self::Upsert(l) => l.load(ctx, data).await,
        }
    }
}

impl From<CsvLoader> for AnyLoader {
    fn from(loader: CsvLoader) -> Self {
        Self::Csv(loader)
    }
}

impl From<JsonLoader> for AnyLoader {
    fn from(loader: JsonLoader) -> Self {
        Self::Json(loader)
    }
}

impl From<SearchLoader> for AnyLoader {
    fn from(loader: SearchLoader) -> Self {
        Self::Search(loader)
    }
}

impl From<BulkInsertLoader> for AnyLoader {
    fn from(loader: BulkInsertLoader) -> Self {
        Self::BulkInsert(loader)
    }
}

impl From<UpsertLoader> for AnyLoader {
    fn from(loader: UpsertLoader) -> Self {
        Self::Upsert(loader)
    }
}
