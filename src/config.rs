//! Pipeline description files
//!
//! A pipeline file names one extractor, an optional transformation and one
//! loader, each selected by its `type` tag. YAML, JSON and JSON5 files are
//! accepted.
//!
//! ```yaml
//! logging:
//!   level: debug
//!   target: governo
//! extractor:
//!   type: zip_csv
//!   source: https://example.org/governo.zip
//!   sep: ","
//!   dtype:
//!     id: int
//! transform:
//!   type: drop_columns
//!   columns: [note]
//! loader:
//!   type: csv
//!   dir: ./data
//!   label: governo
//! ```

use crate::client::{Auth, SearchClient};
use crate::etl::{EtlContext, Pipeline};
use crate::extractors::{
    AnyExtractor, CsvExtractor, CsvOptions, EntryMatcher, ExcelExtractor, ExcelOptions,
    FrameExtractor, HtmlExtractor, NoOpExtractor, SelectorParser, SparqlExtractor, SparqlMethod,
    SqlExtractor, ZipCsvExtractor, ZipExcelExtractor,
};
use crate::loaders::{
    AnyLoader, BulkInsertLoader, CsvLoader, FailurePolicy, JsonLoader, SearchLoader, UpsertLoader,
};
use crate::transform::{AnyTransformation, ColumnDropper, Partition};
use crate::Frame;
use eyre::{Context, Result, bail};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline assembled from a description file
pub type ConfiguredPipeline = Pipeline<AnyExtractor, AnyLoader, AnyTransformation>;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of off, error, warn, info, debug, trace
    pub level: String,
    pub target: Option<String>,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            target: None,
            verbose: false,
        }
    }
}

impl LoggingConfig {
    pub fn context(&self) -> Result<EtlContext> {
        let level: LevelFilter = self
            .level
            .parse()
            .with_context(|| format!("Invalid log level: {}", self.level))?;
        let mut ctx = EtlContext::new().with_level(level).verbose(self.verbose);
        if let Some(target) = &self.target {
            ctx = ctx.with_target(target);
        }
        Ok(ctx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    Csv {
        source: String,
        #[serde(default = "default_true")]
        verify_tls: bool,
        #[serde(flatten)]
        options: CsvOptions,
    },
    ZipCsv {
        source: String,
        #[serde(default = "default_true")]
        verify_tls: bool,
        /// Entry to parse, defaults to the first `.csv` file
        #[serde(default)]
        entry: Option<EntryMatcher>,
        #[serde(flatten)]
        options: CsvOptions,
    },
    Excel {
        source: String,
        #[serde(default = "default_true")]
        verify_tls: bool,
        #[serde(flatten)]
        options: ExcelOptions,
    },
    ZipExcel {
        source: String,
        /// Path fragment of the archive entry
        entry: String,
        #[serde(default = "default_true")]
        verify_tls: bool,
        #[serde(flatten)]
        options: ExcelOptions,
    },
    Sql {
        conn_url: String,
        query: String,
    },
    Sparql {
        endpoint: String,
        query: String,
        #[serde(default)]
        method: SparqlMethod,
        #[serde(default = "SparqlConfigDefaults::max_retries")]
        max_retries: u32,
        #[serde(default = "SparqlConfigDefaults::retry_delay_ms")]
        retry_delay_ms: u64,
    },
    Html {
        source: String,
        #[serde(default = "default_true")]
        verify_tls: bool,
        #[serde(default)]
        verbosely: bool,
        #[serde(flatten)]
        parser: SelectorParser,
    },
    /// Rows written in the file itself
    Inline {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<Value>>,
    },
    Noop,
}

struct SparqlConfigDefaults;

impl SparqlConfigDefaults {
    fn max_retries() -> u32 {
        3
    }

    fn retry_delay_ms() -> u64 {
        1000
    }
}

impl ExtractorConfig {
    pub fn build(self) -> Result<AnyExtractor> {
        let extractor = match self {
            Self::Csv {
                source,
                verify_tls,
                options,
            } => CsvExtractor::new(source)
                .with_options(options)
                .verify_tls(verify_tls)
                .into(),
            Self::ZipCsv {
                source,
                verify_tls,
                entry,
                options,
            } => {
                let mut extractor = ZipCsvExtractor::new(source)
                    .with_options(options)
                    .verify_tls(verify_tls);
                if let Some(matcher) = entry {
                    extractor = extractor.with_matcher(matcher);
                }
                extractor.into()
            }
            Self::Excel {
                source,
                verify_tls,
                options,
            } => ExcelExtractor::new(source)
                .with_options(options)
                .verify_tls(verify_tls)
                .into(),
            Self::ZipExcel {
                source,
                entry,
                verify_tls,
                options,
            } => ZipExcelExtractor::new(source, entry)
                .with_options(options)
                .verify_tls(verify_tls)
                .into(),
            Self::Sql { conn_url, query } => SqlExtractor::new(conn_url, query).into(),
            Self::Sparql {
                endpoint,
                query,
                method,
                max_retries,
                retry_delay_ms,
            } => SparqlExtractor::new(&endpoint, query)?
                .method(method)
                .max_retries(max_retries)
                .retry_delay(Duration::from_millis(retry_delay_ms))
                .into(),
            Self::Html {
                source,
                verify_tls,
                verbosely,
                parser,
            } => HtmlExtractor::new(source, parser)
                .verbosely(verbosely)
                .verify_tls(verify_tls)
                .into(),
            Self::Inline { columns, rows } => {
                FrameExtractor::new(Frame::from_rows(columns, rows)?).into()
            }
            Self::Noop => NoOpExtractor.into(),
        };
        Ok(extractor)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    #[default]
    Identity,
    DropColumns {
        columns: Vec<String>,
    },
    Partition {
        column: String,
        #[serde(default)]
        drop_key: bool,
        #[serde(default)]
        missing_label: Option<String>,
    },
}

impl TransformConfig {
    pub fn build(self) -> AnyTransformation {
        match self {
            Self::Identity => AnyTransformation::Identity,
            Self::DropColumns { columns } => ColumnDropper::new(columns).into(),
            Self::Partition {
                column,
                drop_key,
                missing_label,
            } => {
                let mut partition = Partition::new(column).drop_key(drop_key);
                if let Some(label) = missing_label {
                    partition = partition.missing_label(label);
                }
                partition.into()
            }
        }
    }
}

/// Connection settings of a search loader
///
/// When `hosts` is absent the client comes from the caller's fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConnection {
    /// Comma-separated host URLs
    pub hosts: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub apikey: Option<String>,
}

impl SearchConnection {
    fn client(self, fallback: impl FnOnce() -> Result<SearchClient>) -> Result<SearchClient> {
        match self.hosts {
            Some(hosts) => SearchClient::try_new(
                SearchClient::parse_hosts(&hosts)?,
                Auth::from_credentials(self.username, self.password, self.apikey),
            ),
            None => fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoaderConfig {
    Csv {
        dir: PathBuf,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        encoding: Option<String>,
        #[serde(default)]
        sep: Option<char>,
    },
    Json {
        path: PathBuf,
        #[serde(default)]
        encoding: Option<String>,
    },
    Search {
        index: String,
        #[serde(default)]
        doc_type: Option<String>,
        #[serde(default)]
        id_field: Option<String>,
        #[serde(default)]
        mapping: Option<Value>,
        #[serde(default)]
        batch_size: Option<usize>,
        #[serde(default)]
        delete: bool,
        #[serde(default)]
        settle_delay_ms: Option<u64>,
        #[serde(flatten)]
        connection: SearchConnection,
    },
    BulkInsert {
        conn_url: String,
        table: String,
        #[serde(default)]
        chunk_size: Option<usize>,
        #[serde(default)]
        batch_size: Option<usize>,
        #[serde(default)]
        on_failure: FailurePolicy,
    },
    Upsert {
        conn_url: String,
        table: String,
        #[serde(default)]
        update_fields: Vec<String>,
        #[serde(default)]
        on_failure: FailurePolicy,
    },
}

impl LoaderConfig {
    /// Build the loader, asking `search_fallback` for a client when a search
    /// loader names no hosts
    pub fn build(self, search_fallback: impl FnOnce() -> Result<SearchClient>) -> Result<AnyLoader> {
        let loader = match self {
            Self::Csv {
                dir,
                label,
                encoding,
                sep,
            } => {
                let mut loader = CsvLoader::new(dir);
                if let Some(label) = label {
                    loader = loader.label(label);
                }
                if let Some(encoding) = encoding {
                    loader = loader.encoding(encoding);
                }
                if let Some(sep) = sep {
                    loader = loader.sep(sep);
                }
                loader.into()
            }
            Self::Json { path, encoding } => {
                let mut loader = JsonLoader::new(path);
                if let Some(encoding) = encoding {
                    loader = loader.encoding(encoding);
                }
                loader.into()
            }
            Self::Search {
                index,
                doc_type,
                id_field,
                mapping,
                batch_size,
                delete,
                settle_delay_ms,
                connection,
            } => {
                let mut loader =
                    SearchLoader::new(connection.client(search_fallback)?, index).delete(delete);
                if let Some(doc_type) = doc_type {
                    loader = loader.doc_type(doc_type);
                }
                if let Some(id_field) = id_field {
                    loader = loader.id_field(id_field);
                }
                if let Some(mapping) = mapping {
                    loader = loader.mapping(mapping);
                }
                if let Some(batch_size) = batch_size {
                    loader = loader.batch_size(batch_size);
                }
                if let Some(ms) = settle_delay_ms {
                    loader = loader.settle_delay(Duration::from_millis(ms));
                }
                loader.into()
            }
            Self::BulkInsert {
                conn_url,
                table,
                chunk_size,
                batch_size,
                on_failure,
            } => {
                let mut loader = BulkInsertLoader::new(conn_url, table).on_failure(on_failure);
                if let Some(chunk_size) = chunk_size {
                    loader = loader.chunk_size(chunk_size);
                }
                if let Some(batch_size) = batch_size {
                    loader = loader.batch_size(batch_size);
                }
                loader.into()
            }
            Self::Upsert {
                conn_url,
                table,
                update_fields,
                on_failure,
            } => UpsertLoader::new(conn_url, table)
                .update_fields(update_fields)
                .on_failure(on_failure)
                .into(),
        };
        Ok(loader)
    }
}

/// Whole pipeline description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    pub loader: LoaderConfig,
}

impl PipelineConfig {
    /// Read a description file, picking the format from its extension
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, has an unknown
    /// extension, or does not describe a pipeline.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        match extension.as_str() {
            "yml" | "yaml" => Self::from_yaml(&content),
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display())),
            "json5" => json5::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline JSON5: {}", path.display())),
            other => bail!(
                "Unsupported pipeline file extension '{}': use .yml, .yaml, .json or .json5",
                other
            ),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse pipeline YAML")
    }

    /// Assemble the pipeline
    pub fn build(
        self,
        search_fallback: impl FnOnce() -> Result<SearchClient>,
    ) -> Result<ConfiguredPipeline> {
        let context = self.logging.context()?;
        let extractor = self.extractor.build()?;
        let loader = self.loader.build(search_fallback)?;
        Ok(Pipeline::new(extractor, loader)
            .with_transformation(self.transform.build())
            .with_context(context))
    }
}
