//! Data source locations: remote URLs or local files

use eyre::{Context, Result, eyre};
use reqwest::Client;
use std::fmt;
use std::path::PathBuf;
use url::Url;

const USER_AGENT: &str = concat!("tabular-etl/", env!("CARGO_PKG_VERSION"));

/// Where an extractor reads its bytes from
///
/// Strings starting with `http://` or `https://` are remote, `file://` URLs
/// and everything else are local paths.
///
/// # Example
/// ```
/// use tabular_etl::extractors::Source;
///
/// assert!(Source::parse("https://example.org/data.zip").unwrap().is_remote());
/// assert!(!Source::parse("./data/input.csv").unwrap().is_remote());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(Url),
    Local(PathBuf),
}

impl Source {
    pub fn parse(location: &str) -> Result<Self> {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(location)
                .with_context(|| format!("Invalid source URL: {}", location))?;
            Ok(Self::Remote(url))
        } else if lower.starts_with("file://") {
            let url = Url::parse(location)
                .with_context(|| format!("Invalid source URL: {}", location))?;
            let path = url
                .to_file_path()
                .map_err(|_| eyre!("Invalid file URL: {}", location))?;
            Ok(Self::Local(path))
        } else {
            Ok(Self::Local(PathBuf::from(location)))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Read the whole source into memory
    ///
    /// # Errors
    /// Returns an error on I/O failures and on non-success HTTP statuses
    pub async fn fetch(&self, client: &Client) -> Result<Vec<u8>> {
        match self {
            Self::Remote(url) => {
                log::debug!("Fetching {}", url);
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .with_context(|| format!("Failed to fetch {}", url))?;

                if !response.status().is_success() {
                    eyre::bail!("Failed to fetch {} ({})", url, response.status());
                }

                let bytes = response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read response body from {}", url))?;
                Ok(bytes.to_vec())
            }
            Self::Local(path) => {
                log::debug!("Reading {}", path.display());
                std::fs::read(path)
                    .with_context(|| format!("Failed to read file: {}", path.display()))
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{}", url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Build the HTTP client used by the extractors
///
/// `verify_tls: false` accepts invalid certificates, for public data
/// portals with broken TLS setups.
pub fn http_client(verify_tls: bool) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .with_context(|| "Failed to build HTTP client")
}
