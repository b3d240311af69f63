//! HTML page extractor with pluggable parsing

use super::source::{Source, http_client};
use crate::etl::{EtlContext, Extractor};
use crate::{Frame, Record};
use eyre::{Result, eyre};
use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Turns raw page content into records
pub trait HtmlParser {
    fn parse(&self, ctx: &EtlContext, content: &[u8]) -> Result<Vec<Record>>;
}

/// Extractor fetching a page and delegating parsing to an [`HtmlParser`]
///
/// With `verbosely`, the parser sees a context with verbosity forced on for
/// this extraction only.
#[derive(Debug, Clone)]
pub struct HtmlExtractor<P> {
    source: String,
    parser: P,
    verbosely: bool,
    verify_tls: bool,
}

impl<P: HtmlParser> HtmlExtractor<P> {
    pub fn new(source: impl Into<String>, parser: P) -> Self {
        Self {
            source: source.into(),
            parser,
            verbosely: false,
            verify_tls: true,
        }
    }

    pub fn verbosely(mut self, verbosely: bool) -> Self {
        self.verbosely = verbosely;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }
}

impl<P: HtmlParser + Send + Sync> Extractor for HtmlExtractor<P> {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let source = Source::parse(&self.source)?;
        ctx.debug(format_args!("Fetching page {}", source));
        let content = source.fetch(&http_client(self.verify_tls)?).await?;

        let records = if self.verbosely {
            self.parser.parse(&ctx.with_verbosity(true), &content)?
        } else {
            self.parser.parse(ctx, &content)?
        };

        ctx.debug(format_args!("Parsed {} records from {}", records.len(), source));
        Ok(Frame::from_records(&records))
    }
}

/// How a field is read from the matched element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSelector {
    /// CSS selector relative to the row, empty for the row itself
    #[serde(default)]
    pub selector: String,
    /// Attribute to read instead of the text content
    #[serde(default)]
    pub attr: Option<String>,
}

impl FieldSelector {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attr: None,
        }
    }

    pub fn attr(selector: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attr: Some(attr.into()),
        }
    }
}

/// Parser driven by CSS selectors
///
/// Each element matching `rows` yields one record; each field takes the
/// first match of its selector inside the row. Missing matches are null.
///
/// # Example
/// ```
/// use tabular_etl::extractors::{FieldSelector, HtmlParser, SelectorParser};
/// use tabular_etl::etl::EtlContext;
///
/// let parser = SelectorParser::new("table tr.member")
///     .field("name", FieldSelector::text("td.name"))
///     .field("profile", FieldSelector::attr("a", "href"));
///
/// let html = br#"<table><tr class="member"><td class="name"> Mario
///     Rossi </td><td><a href="/p/1">link</a></td></tr></table>"#;
/// let records = parser.parse(&EtlContext::new(), html).unwrap();
/// assert_eq!(records[0]["name"], "Mario Rossi");
/// assert_eq!(records[0]["profile"], "/p/1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorParser {
    pub rows: String,
    #[serde(default)]
    pub fields: IndexMap<String, FieldSelector>,
}

impl SelectorParser {
    pub fn new(rows: impl Into<String>) -> Self {
        Self {
            rows: rows.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: FieldSelector) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| eyre!("Invalid CSS selector '{}': {:?}", selector, e))
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn read_field(row: ElementRef<'_>, selector: Option<&Selector>, attr: Option<&str>) -> Value {
    let element = match selector {
        Some(sel) => match row.select(sel).next() {
            Some(el) => el,
            None => return Value::Null,
        },
        None => row,
    };

    match attr {
        Some(name) => element
            .value()
            .attr(name)
            .map(|v| Value::String(collapse(v)))
            .unwrap_or(Value::Null),
        None => Value::String(collapse(&element.text().collect::<String>())),
    }
}

impl HtmlParser for SelectorParser {
    fn parse(&self, ctx: &EtlContext, content: &[u8]) -> Result<Vec<Record>> {
        let rows = parse_selector(&self.rows)?;
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| {
                let selector = if field.selector.trim().is_empty() {
                    None
                } else {
                    Some(parse_selector(&field.selector)?)
                };
                Ok((name.as_str(), selector, field.attr.as_deref()))
            })
            .collect::<Result<Vec<_>>>()?;

        let document = Html::parse_document(&String::from_utf8_lossy(content));
        let mut records = Vec::new();
        for (i, row) in document.select(&rows).enumerate() {
            let mut record = Record::new();
            for (name, selector, attr) in &fields {
                record.insert(name.to_string(), read_field(row, selector.as_ref(), *attr));
            }
            ctx.verbose_info(format_args!("Row {}: {}", i, Value::Object(record.clone())));
            records.push(record);
        }
        Ok(records)
    }
}
