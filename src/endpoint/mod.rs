//! Same-origin WebSocket endpoint resolution.
//!
//! The hosting page's location is injected through [`LocationSource`], so
//! resolution is a pure function of that location and the logical path.

use std::fmt;

use thiserror::Error;
use url::{ParseError, Url};

/// Location of the page hosting the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    /// Page served over https
    pub secure: bool,
    /// Host with optional port, e.g. `localhost:8000`
    pub host: String,
    /// Path of the page, e.g. `/app/`
    pub path: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("page URL has no scheme: {0}")]
    MissingScheme(String),

    #[error("page URL has no host: {0}")]
    MissingHost(String),

    #[error("invalid page URL: {0}")]
    Invalid(#[from] ParseError),
}

impl PageLocation {
    pub fn new(secure: bool, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            secure,
            host: host.into(),
            path: path.into(),
        }
    }

    /// Parse a page URL such as `https://console.local/app/`.
    ///
    /// Credentials, query string and fragment are ignored. Only `https`
    /// and `wss` count as secure; every other scheme resolves to plain `ws`.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let parsed = Url::parse(raw).map_err(|e| match e {
            ParseError::RelativeUrlWithoutBase => EndpointError::MissingScheme(raw.to_string()),
            other => other.into(),
        })?;

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(EndpointError::MissingHost(raw.to_string())),
        };
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let secure = matches!(parsed.scheme(), "https" | "wss");

        Ok(Self::new(secure, host, parsed.path()))
    }

    fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }
}

/// Supplies the current page location.
///
/// Read once per [`resolve`] call and never cached, so a navigation is
/// picked up by the next channel open.
pub trait LocationSource {
    fn location(&self) -> PageLocation;
}

impl LocationSource for PageLocation {
    fn location(&self) -> PageLocation {
        self.clone()
    }
}

impl<F> LocationSource for F
where
    F: Fn() -> PageLocation,
{
    fn location(&self) -> PageLocation {
        self()
    }
}

/// Resolved WebSocket URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_secure(&self) -> bool {
        self.0.starts_with("wss://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

/// Build the endpoint for `logical_path` under the page's own base path.
///
/// `logical_path` is expected to start with `/`; it is not validated.
pub fn resolve<L>(source: &L, logical_path: &str) -> Endpoint
where
    L: LocationSource + ?Sized,
{
    let location = source.location();
    let base = location.path.trim_end_matches('/');

    Endpoint(format!(
        "{}://{}{}{}",
        location.ws_scheme(),
        location.host,
        base,
        logical_path
    ))
}
