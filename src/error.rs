//! Typed errors for the scraping engine.
//!
//! Library errors use `thiserror`; every public operation returns
//! [`Result`], which carries the crate-level [`Error`].

use thiserror::Error;

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BadPayloadKind {
    /// No parts could be compiled from the payload fields
    #[error("no parts found")]
    NoParts,

    /// No usable selectors, or no common structure across them in the page
    #[error("no selectors found")]
    NoSelectors,

    /// A field has an empty name
    #[error("no name provided for field {index}")]
    NoName { index: usize },

    /// A field has an empty selector
    #[error("no selector provided for field {name}")]
    NoSelector { name: String },

    /// Two parts compiled to the same name
    #[error("part {name} has a duplicate name")]
    DuplicateName { name: String },

    /// The whole run finished without a single non-empty block
    #[error("empty results")]
    EmptyResults,
}

/// Errors returned by fetchers.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("404 page not found: {url}")]
    NotFound { url: String },

    #[error("403 forbidden: {url}")]
    Forbidden { url: String },

    #[error("401 unauthorized: {url}")]
    Unauthorized { url: String },

    #[error("407 proxy authentication required")]
    ProxyAuthRequired,

    #[error("500 internal server error: {url}")]
    InternalServerError { url: String },

    #[error("502 bad gateway: {url}")]
    BadGateway { url: String },

    #[error("504 gateway timeout: {url}")]
    GatewayTimeout { url: String },

    #[error("400 bad request: {0}")]
    BadRequest(String),

    #[error("unexpected status {status}: {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Maps a non-success HTTP status to its error, `None` for 2xx.
    pub fn from_status(status: u16, url: &str) -> Option<Self> {
        let url = url.to_string();
        let err = match status {
            200..=299 => return None,
            400 => FetchError::BadRequest(url),
            401 => FetchError::Unauthorized { url },
            403 => FetchError::Forbidden { url },
            404 => FetchError::NotFound { url },
            407 => FetchError::ProxyAuthRequired,
            500 => FetchError::InternalServerError { url },
            502 => FetchError::BadGateway { url },
            504 => FetchError::GatewayTimeout { url },
            status => FetchError::UnexpectedStatus { status, url },
        };
        Some(err)
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::InternalServerError { .. }
            | FetchError::BadGateway { .. }
            | FetchError::GatewayTimeout { .. } => true,
            FetchError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            FetchError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Errors returned by [`crate::store::Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unsupported storage type: {0}")]
    Unsupported(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while extracting a single part value.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot resolve {value} against {base}: {source}")]
    Resolve {
        value: String,
        base: String,
        #[source]
        source: url::ParseError,
    },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad payload: {0}")]
    BadPayload(BadPayloadKind),

    #[error("forbidden by robots.txt: {url}")]
    ForbiddenByRobots { url: String },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("field {field}: invalid regexp: {source}")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("field {field}: extractor {extractor} requires parameter {param}")]
    MissingParam {
        field: String,
        extractor: String,
        param: &'static str,
    },

    #[error("invalid selector: {selector}")]
    InvalidSelector { selector: String },

    #[error("invalid output format specified: {0}")]
    InvalidOutputFormat(String),

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<BadPayloadKind> for Error {
    fn from(kind: BadPayloadKind) -> Self {
        Error::BadPayload(kind)
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(FetchError::from_status(200, "http://a").is_none());
        assert!(matches!(
            FetchError::from_status(404, "http://a/x"),
            Some(FetchError::NotFound { url }) if url == "http://a/x"
        ));
        assert!(matches!(
            FetchError::from_status(407, "http://a"),
            Some(FetchError::ProxyAuthRequired)
        ));
        assert!(matches!(
            FetchError::from_status(418, "http://a"),
            Some(FetchError::UnexpectedStatus { status: 418, .. })
        ));
    }

    #[test]
    fn test_transient_errors() {
        let gw = FetchError::from_status(502, "http://a").unwrap();
        assert!(gw.is_transient());
        let nf = FetchError::from_status(404, "http://a").unwrap();
        assert!(!nf.is_transient());
    }

    #[test]
    fn test_bad_payload_message() {
        let err: Error = BadPayloadKind::NoParts.into();
        assert_eq!(err.to_string(), "bad payload: no parts found");
    }
}
