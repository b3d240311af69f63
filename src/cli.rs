//! CLI helper functions

use crate::{
    Frame,
    client::{Auth, SearchClient},
    config::PipelineConfig,
    etl::{EtlContext, Extractor},
    extractors::{SparqlExtractor, SparqlMethod},
    frame::cell_to_string,
};
use eyre::{Context, Result, eyre};
use serde_json::Value;
use std::path::Path;

/// Load search cluster client from environment variables
///
/// Expected environment variables:
/// - SEARCH_URL: Comma-separated host URLs (required)
/// - SEARCH_USERNAME: Username for basic auth (optional)
/// - SEARCH_PASSWORD: Password for basic auth (optional)
/// - SEARCH_APIKEY: API key for auth (optional, wins over username/password)
pub fn load_search_client() -> Result<SearchClient> {
    let hosts = std::env::var("SEARCH_URL").context("SEARCH_URL environment variable not set")?;
    let hosts = SearchClient::parse_hosts(&hosts)
        .with_context(|| format!("Invalid SEARCH_URL: {}", hosts))?;

    let auth = Auth::from_credentials(
        std::env::var("SEARCH_USERNAME").ok(),
        std::env::var("SEARCH_PASSWORD").ok(),
        std::env::var("SEARCH_APIKEY").ok(),
    );

    SearchClient::try_new(hosts, auth).context("Failed to create search client")
}

/// Run the pipeline described in a file
///
/// Returns the number of rows loaded.
pub async fn run_pipeline_file(path: impl AsRef<Path>, verbose: bool) -> Result<usize> {
    let path = path.as_ref();
    log::info!("Reading pipeline from {}", path.display());

    let mut config = PipelineConfig::read(path)?;
    if verbose {
        config.logging.verbose = true;
    }
    log::debug!(
        "Pipeline: {:?} -> {:?} -> {:?}",
        config.extractor,
        config.transform,
        config.loader
    );

    let mut pipeline = config.build(load_search_client)?;
    let loaded = pipeline.run().await?.loaded().unwrap_or_default();
    Ok(loaded)
}

/// Query a SPARQL endpoint and return the frame
pub async fn query_sparql(
    endpoint: &str,
    query: &str,
    post: bool,
    max_retries: u32,
) -> Result<Frame> {
    let method = match post {
        true => SparqlMethod::Post,
        false => SparqlMethod::Get,
    };
    SparqlExtractor::new(endpoint, query)?
        .method(method)
        .max_retries(max_retries)
        .extract(&EtlContext::new())
        .await
}

/// Render a frame as comma-separated text with a header row
pub fn frame_to_csv(frame: &Frame) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(frame.columns())?;
    for row in frame.rows() {
        writer.write_record(row.iter().map(cell_to_string))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| eyre!("Failed to flush CSV buffer: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Check connectivity and credentials against the search cluster
///
/// Returns the cluster info document.
pub async fn ping_search() -> Result<Value> {
    let client = load_search_client()?;
    log::info!("Pinging {}", client);
    client.ping().await
}
