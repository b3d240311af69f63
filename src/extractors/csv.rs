//! Delimited-text extractors, plain and zipped

use super::archive::{EntryMatcher, read_matching_entry};
use super::options::TableOptions;
use super::source::{Source, http_client};
use crate::Frame;
use crate::etl::{EtlContext, Extractor};
use encoding_rs::Encoding;
use eyre::{Result, bail, eyre};
use serde::{Deserialize, Serialize};

/// Options for reading delimited text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field separator, defaults to `;`
    pub sep: char,
    /// Encoding label understood by encoding_rs, defaults to `utf8`
    pub encoding: String,
    #[serde(flatten)]
    pub table: TableOptions,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            sep: ';',
            encoding: "utf8".to_string(),
            table: TableOptions::default(),
        }
    }
}

impl CsvOptions {
    pub fn sep(mut self, sep: char) -> Self {
        self.sep = sep;
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn table(mut self, table: TableOptions) -> Self {
        self.table = table;
        self
    }

    /// Decode and parse delimited text into a frame
    ///
    /// # Errors
    /// Returns an error for unknown encodings, non-ASCII separators,
    /// malformed records and shaping failures.
    pub fn parse(&self, bytes: &[u8]) -> Result<Frame> {
        let encoding = Encoding::for_label(self.encoding.as_bytes())
            .ok_or_else(|| eyre!("Unknown encoding: {}", self.encoding))?;
        if !self.sep.is_ascii() {
            bail!("Separator must be an ASCII character, got '{}'", self.sep);
        }

        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            log::warn!(
                "Malformed {} sequences replaced while decoding",
                encoding.name()
            );
        }

        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.sep as u8)
            .from_reader(text.as_bytes());

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record?;
            grid.push(record.iter().map(str::to_string).collect());
        }

        self.table.shape(grid)
    }
}

/// Extractor for uncompressed delimited text, local or remote
///
/// # Example
/// ```no_run
/// use tabular_etl::extractors::{CsvExtractor, CsvOptions};
/// use tabular_etl::etl::{EtlContext, Extractor};
///
/// # async fn example() -> eyre::Result<()> {
/// let extractor = CsvExtractor::new("https://example.org/comuni.csv")
///     .with_options(CsvOptions::default().sep(',').encoding("latin1"));
/// let frame = extractor.extract(&EtlContext::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    source: String,
    options: CsvOptions,
    verify_tls: bool,
}

impl CsvExtractor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            options: CsvOptions::default(),
            verify_tls: true,
        }
    }

    pub fn with_options(mut self, options: CsvOptions) -> Self {
        self.options = options;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Extractor for CsvExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let source = Source::parse(&self.source)?;
        ctx.debug(format_args!("Reading CSV from {}", source));

        let bytes = source.fetch(&http_client(self.verify_tls)?).await?;
        let frame = self.options.parse(&bytes)?;

        ctx.debug(format_args!("Parsed {} rows from {}", frame.len(), source));
        Ok(frame)
    }
}

/// Extractor for delimited text inside a zip archive
///
/// The first entry whose name ends in `.csv` is parsed, unless a different
/// [`EntryMatcher`] is set.
#[derive(Debug, Clone)]
pub struct ZipCsvExtractor {
    source: String,
    options: CsvOptions,
    matcher: EntryMatcher,
    verify_tls: bool,
}

impl ZipCsvExtractor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            options: CsvOptions::default(),
            matcher: EntryMatcher::Extension(".csv".to_string()),
            verify_tls: true,
        }
    }

    pub fn with_options(mut self, options: CsvOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_matcher(mut self, matcher: EntryMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

impl Extractor for ZipCsvExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let source = Source::parse(&self.source)?;
        ctx.debug(format_args!("Fetching zipped CSV from {}", source));

        let bytes = source.fetch(&http_client(self.verify_tls)?).await?;
        let (entry, content) = read_matching_entry(bytes, &self.matcher, &self.source)?;
        ctx.info(format_args!("Parsing {} from {}", entry, source));

        self.options.parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::archive::tests::build_zip;
    use crate::extractors::options::Dtype;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    #[test]
    fn test_parse_semicolon_default() {
        let frame = CsvOptions::default().parse(b"a;b\n1;x\n2;y\n").unwrap();
        assert_eq!(frame.columns(), &["a", "b"]);
        assert_eq!(
            frame.to_json_records(),
            json!([{"a": "1", "b": "x"}, {"a": "2", "b": "y"}])
        );
    }

    #[test]
    fn test_parse_quoted_comma() {
        let frame = CsvOptions::default()
            .sep(',')
            .parse(b"name,descr\n\"Rossi, Mario\",\"a \"\"quoted\"\" word\"\n")
            .unwrap();
        assert_eq!(frame.get(0, "name"), Some(&json!("Rossi, Mario")));
        assert_eq!(frame.get(0, "descr"), Some(&json!("a \"quoted\" word")));
    }

    #[test]
    fn test_parse_latin1() {
        // "città" in windows-1252
        let bytes = [b'c', b'\n', b'c', b'i', b't', b't', 0xE0, b'\n'];
        let frame = CsvOptions::default().encoding("latin1").parse(&bytes).unwrap();
        assert_eq!(frame.get(0, "c"), Some(&json!("città")));
    }

    #[test]
    fn test_unknown_encoding() {
        let err = CsvOptions::default().encoding("klingon").parse(b"a").unwrap_err();
        assert!(err.to_string().contains("Unknown encoding"));
    }

    #[test]
    fn test_non_ascii_separator() {
        assert!(CsvOptions::default().sep('§').parse(b"a").is_err());
    }

    #[test]
    fn test_table_options_apply() {
        let options = CsvOptions::default().table(
            TableOptions::default()
                .skip_rows(1)
                .dtype("n", Dtype::Int),
        );
        let frame = options.parse(b"generated by export\nn;label\n7;NA\n").unwrap();
        assert_eq!(frame.rows()[0], vec![json!(7), Value::Null]);
    }

    #[tokio::test]
    async fn test_extract_local_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "a;b\n1;x\n").unwrap();

        let frame = CsvExtractor::new(path.to_string_lossy())
            .extract(&EtlContext::new())
            .await
            .unwrap();
        assert_eq!(frame.len(), 1);
    }

    #[tokio::test]
    async fn test_zip_extract_first_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.zip");
        std::fs::write(
            &path,
            build_zip(&[
                ("LEGGIMI.txt", "nothing here"),
                ("governi.csv", "id;nome\n1;Conte\n"),
                ("other.csv", "x\n9\n"),
            ]),
        )
        .unwrap();

        let frame = ZipCsvExtractor::new(path.to_string_lossy())
            .extract(&EtlContext::new())
            .await
            .unwrap();
        assert_eq!(frame.columns(), &["id", "nome"]);
        assert_eq!(frame.get(0, "nome"), Some(&json!("Conte")));
    }

    #[tokio::test]
    async fn test_zip_without_csv_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.zip");
        std::fs::write(&path, build_zip(&[("data.txt", "a")])).unwrap();

        let err = ZipCsvExtractor::new(path.to_string_lossy())
            .extract(&EtlContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Could not find file *.csv"));
    }
}
