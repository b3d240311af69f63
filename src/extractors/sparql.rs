//! SPARQL endpoint extractor with bounded retries

use super::source::http_client;
use crate::Frame;
use crate::etl::{EtlContext, Extractor};
use eyre::{Context, Report, Result, bail, eyre};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

const RESULTS_MEDIA_TYPE: &str = "application/sparql-results+json";

/// How the query travels to the endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparqlMethod {
    /// `?query=` in the URL
    #[default]
    Get,
    /// URL-encoded form body
    Post,
}

/// Extractor for SPARQL SELECT and ASK queries
///
/// Transient failures (connection errors, timeouts, HTTP 5xx and 429) are
/// retried until `max_retries` attempts have failed. Any other failure is
/// returned at once.
///
/// # Example
/// ```no_run
/// use tabular_etl::extractors::SparqlExtractor;
/// use tabular_etl::etl::{EtlContext, Extractor};
///
/// # async fn example() -> eyre::Result<()> {
/// let extractor = SparqlExtractor::new(
///     "https://dati.camera.it/sparql",
///     "SELECT ?s ?label WHERE { ?s rdfs:label ?label } LIMIT 10",
/// )?
/// .max_retries(5);
/// let frame = extractor.extract(&EtlContext::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SparqlExtractor {
    endpoint: Url,
    query: String,
    method: SparqlMethod,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
}

/// Outcome of one request
enum Attempt {
    Done(Value),
    Transient(Report),
}

impl SparqlExtractor {
    pub fn new(endpoint: &str, query: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid SPARQL endpoint: {}", endpoint))?;
        Ok(Self {
            endpoint,
            query: query.into(),
            method: SparqlMethod::Get,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        })
    }

    pub fn method(mut self, method: SparqlMethod) -> Self {
        self.method = method;
        self
    }

    /// Total attempts allowed; values below 1 are raised to 1
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn attempt(&self, client: &reqwest::Client) -> Result<Attempt> {
        let request = match self.method {
            SparqlMethod::Get => {
                let mut url = self.endpoint.clone();
                url.query_pairs_mut().append_pair("query", &self.query);
                client.get(url)
            }
            SparqlMethod::Post => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("query", &self.query)
                    .finish();
                client
                    .post(self.endpoint.clone())
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(body)
            }
        };

        let response = match request
            .header(reqwest::header::ACCEPT, RESULTS_MEDIA_TYPE)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Ok(Attempt::Transient(Report::new(e)));
            }
            Err(e) => return Err(Report::new(e).wrap_err("SPARQL request failed")),
        };

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::Transient(eyre!(
                "SPARQL endpoint {} answered {}",
                self.endpoint,
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("SPARQL query rejected ({}): {}", status, body.trim());
        }

        let value = response
            .json::<Value>()
            .await
            .with_context(|| "Failed to decode SPARQL JSON results")?;
        Ok(Attempt::Done(value))
    }
}

impl Extractor for SparqlExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let client = http_client(true)?;
        let mut remaining = self.max_retries;

        loop {
            ctx.debug(format_args!(
                "Querying {} ({} attempts left)",
                self.endpoint, remaining
            ));

            match self.attempt(&client).await? {
                Attempt::Done(value) => return results_to_frame(&value),
                Attempt::Transient(err) => {
                    remaining -= 1;
                    if remaining == 0 {
                        return Err(err.wrap_err(format!(
                            "SPARQL query failed after {} attempts",
                            self.max_retries
                        )));
                    }
                    ctx.warn(format_args!("{:#}, retrying", err));
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Flatten SPARQL JSON results into a frame
///
/// Columns follow `head.vars`, with variables appearing only in bindings
/// appended in first-appearance order. Unbound variables are null.
pub fn results_to_frame(value: &Value) -> Result<Frame> {
    if let Some(answer) = value.get("boolean").and_then(Value::as_bool) {
        return Frame::from_rows(vec!["boolean".to_string()], vec![vec![Value::Bool(answer)]]);
    }

    let bindings = value
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| eyre!("SPARQL results carry neither bindings nor a boolean"))?;

    let mut columns: Vec<String> = value
        .pointer("/head/vars")
        .and_then(Value::as_array)
        .map(|vars| {
            vars.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for binding in bindings {
        if let Some(map) = binding.as_object() {
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut frame = Frame::new(columns.clone());
    for binding in bindings {
        let row = columns
            .iter()
            .map(|col| {
                binding
                    .get(col)
                    .and_then(|term| term.get("value"))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        frame.push_row(row)?;
    }
    Ok(frame)
}
