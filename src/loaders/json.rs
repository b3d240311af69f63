//! JSON file loader

use super::csv::encode;
use crate::Dataset;
use crate::etl::{EtlContext, Loader};
use eyre::{Context, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Writes processed data as one pretty-printed JSON document
///
/// A frame becomes an array of records, labeled frames an object of
/// label → records, and a record list is written as is.
///
/// Failures are logged and swallowed: the loader then reports 0 rows.
#[derive(Debug, Clone)]
pub struct JsonLoader {
    path: PathBuf,
    encoding: String,
}

impl JsonLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoding: "utf8".to_string(),
        }
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    fn write(&self, data: &Dataset) -> Result<usize> {
        let document = match data {
            Dataset::Frame(frame) => frame.to_json_records(),
            Dataset::Labeled(frames) => Value::Object(
                frames
                    .iter()
                    .map(|(label, frame)| (label.clone(), frame.to_json_records()))
                    .collect::<Map<_, _>>(),
            ),
            Dataset::Records(items) => Value::Array(items.clone()),
        };

        let text = serde_json::to_vec_pretty(&document)?;
        let bytes = encode(text, &self.encoding)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(data.row_count())
    }
}

impl Loader for JsonLoader {
    async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
        match self.write(data) {
            Ok(rows) => {
                ctx.info(format_args!("Wrote {} rows to {}", rows, self.path.display()));
                Ok(rows)
            }
            Err(e) => {
                ctx.error(format_args!("{:#}", e));
                Ok(0)
            }
        }
    }
}
