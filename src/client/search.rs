//! Search cluster client
//!
//! Provides `SearchClient` for talking to an Elasticsearch-compatible cluster.
//! Requests go to the first host; when a host cannot be reached the next one
//! is tried.

use super::Auth;
use eyre::{Context, Result, bail, eyre};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use url::Url;

const NDJSON: &str = "application/x-ndjson";
const JSON: &str = "application/json";

/// Client for a search cluster with host failover.
///
/// # Example
/// ```no_run
/// use tabular_etl::client::{Auth, SearchClient};
/// use url::Url;
///
/// # async fn example() -> eyre::Result<()> {
/// let hosts = vec![
///     Url::parse("http://es-1:9200")?,
///     Url::parse("http://es-2:9200")?,
/// ];
/// let client = SearchClient::try_new(hosts, Auth::None)?;
///
/// if !client.index_exists("areas").await? {
///     client.create_index("areas", None).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SearchClient {
    client: Client,
    hosts: Vec<Url>,
}

impl SearchClient {
    /// Create a new client
    ///
    /// # Errors
    /// Returns an error if no host is given or the HTTP client cannot be built
    pub fn try_new(hosts: Vec<Url>, auth: Auth) -> Result<Self> {
        if hosts.is_empty() {
            bail!("At least one search host is required");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(value) = auth.header_value()? {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self { client, hosts })
    }

    /// Parse a comma-separated host list
    pub fn parse_hosts(hosts: &str) -> Result<Vec<Url>> {
        hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| Url::parse(h).with_context(|| format!("Invalid search host: {}", h)))
            .collect()
    }

    pub fn hosts(&self) -> &[Url] {
        &self.hosts
    }

    /// Send a request, failing over to the next host on connection errors.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path, relative to the host
    /// * `body` - Optional body with its content type
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<(&str, Vec<u8>)>,
    ) -> Result<reqwest::Response> {
        let path_stripped = path.strip_prefix('/').unwrap_or(path);
        let mut last_error = None;

        for host in &self.hosts {
            let url = host
                .join(path_stripped)
                .with_context(|| format!("Invalid path: {}", path))?;
            let mut request = self.client.request(method.clone(), url);
            if let Some((content_type, bytes)) = &body {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, *content_type)
                    .body(bytes.clone());
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() => {
                    log::warn!("Search host {} unreachable: {}", host, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(eyre!("Failed to send request: {}", e)),
            }
        }

        match last_error {
            Some(e) => Err(eyre!("No search host reachable: {}", e)),
            None => Err(eyre!("No search host configured")),
        }
    }

    /// Verify the connection and authentication to the cluster.
    ///
    /// Returns the cluster info document.
    pub async fn ping(&self) -> Result<Value> {
        let response = self.request(Method::GET, "/", None).await?;
        json_or_error(response, "ping").await
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.request(Method::HEAD, index, None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => bail!("Failed to check index {} ({})", index, status),
        }
    }

    pub async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self.request(Method::DELETE, index, None).await?;
        json_or_error(response, &format!("delete index {}", index)).await?;
        Ok(())
    }

    /// Create an index, with optional settings and mappings
    pub async fn create_index(&self, index: &str, body: Option<&Value>) -> Result<()> {
        let body = body
            .map(|b| serde_json::to_vec(b).map(|bytes| (JSON, bytes)))
            .transpose()?;
        let response = self.request(Method::PUT, index, body).await?;
        json_or_error(response, &format!("create index {}", index)).await?;
        Ok(())
    }

    /// Apply a mapping, under a document type when one is given
    pub async fn put_mapping(
        &self,
        index: &str,
        doc_type: Option<&str>,
        mapping: &Value,
    ) -> Result<()> {
        let path = match doc_type {
            Some(doc_type) => format!("{}/_mapping/{}", index, doc_type),
            None => format!("{}/_mapping", index),
        };
        let body = serde_json::to_vec(mapping)?;
        let response = self.request(Method::PUT, &path, Some((JSON, body))).await?;
        json_or_error(response, &format!("put mapping on {}", index)).await?;
        Ok(())
    }

    /// Send an NDJSON `_bulk` body and return the response document
    pub async fn bulk(&self, body: String) -> Result<Value> {
        let response = self
            .request(Method::POST, "_bulk", Some((NDJSON, body.into_bytes())))
            .await?;
        json_or_error(response, "bulk").await
    }
}

async fn json_or_error(response: reqwest::Response, action: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Search cluster failed to {} ({}): {}", action, status, body);
    }
    response
        .json::<Value>()
        .await
        .with_context(|| format!("Invalid JSON answer to {}", action))
}

impl std::fmt::Display for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hosts: Vec<&str> = self.hosts.iter().map(Url::as_str).collect();
        write!(f, "{}", hosts.join(", "))
    }
}
