use base64::Engine;
use eyre::Result;
use reqwest::header::HeaderValue;

#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Use an API key authentication via headers
    Apikey(String),
    /// Use username and password authentication via Basic Auth headers
    Basic(String, String),
    /// Don't use any authentication
    None,
}

impl Auth {
    /// Pick an auth method from optional credentials
    ///
    /// An API key wins over username and password. A username without a
    /// password gives no authentication.
    pub fn from_credentials(
        username: Option<String>,
        password: Option<String>,
        apikey: Option<String>,
    ) -> Self {
        match (username, password, apikey) {
            (_, _, Some(apikey)) => Self::Apikey(apikey),
            (Some(username), Some(password), None) => Self::Basic(username, password),
            _ => Self::None,
        }
    }

    /// Value of the `Authorization` header, if any
    pub fn header_value(&self) -> Result<Option<HeaderValue>> {
        let value = match self {
            Self::Basic(username, password) => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                format!("Basic {}", credentials)
            }
            Self::Apikey(apikey) => format!("ApiKey {}", apikey),
            Self::None => return Ok(None),
        };
        let mut header: HeaderValue = value.parse()?;
        header.set_sensitive(true);
        Ok(Some(header))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apikey(_) => write!(f, "Apikey"),
            Self::Basic(_, _) => write!(f, "Basic"),
            Self::None => write!(f, "None"),
        }
    }
}

// Credentials never show up in debug output
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic(username, _) => write!(f, "Basic({}, ***)", username),
            other => write!(f, "{}", other),
        }
    }
}
