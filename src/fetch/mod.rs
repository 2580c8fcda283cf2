//! Page fetching.
//!
//! A [`Request`] names its fetcher through [`FetcherType`]; the
//! [`FetchDispatcher`] routes it to the plain HTTP fetcher or the
//! script-rendering one. Cross-cutting behavior (counting, logging,
//! caching, retries) is layered on with the decorators in [`middleware`], composed once by
//! [`crate::engine::Engine`].

mod http;
pub mod middleware;
mod render;

pub use http::HttpFetcher;
pub use middleware::{CachingFetcher, FetchStats, LoggingFetcher, RetryFetcher, StatsFetcher};
pub use render::RenderFetcher;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, FetchError, Result};

/// Which fetcher downloads a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherType {
    /// Plain HTTP, no script execution
    #[default]
    Base,
    /// Script-rendering service
    #[serde(alias = "splash")]
    Chrome,
}

impl fmt::Display for FetcherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetcherType::Base => f.write_str("base"),
            FetcherType::Chrome => f.write_str("chrome"),
        }
    }
}

/// Request descriptor handed to fetchers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "type", default)]
    pub fetcher_type: FetcherType,
    pub url: String,
    /// HTTP method, GET unless form data is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Form-encoded body, e.g. `user=a&pass=b`; sent as POST
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<String>,
    /// Identifies the cookie jar kept across requests of one run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
    #[serde(default)]
    pub infinite_scroll: bool,
    /// Retries for transient failures
    #[serde(skip)]
    pub retries: usize,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, fetcher_type: FetcherType) -> Self {
        self.fetcher_type = fetcher_type;
        self
    }

    /// Target URL, whitespace trimmed.
    pub fn url(&self) -> &str {
        self.url.trim()
    }

    pub fn parsed_url(&self) -> Result<Url> {
        Url::parse(self.url()).map_err(|source| Error::InvalidUrl {
            url: self.url().to_string(),
            source,
        })
    }

    /// Host (with explicit port, if any) of the target URL.
    pub fn host(&self) -> Result<String> {
        let url = self.parsed_url()?;
        let host = url.host_str().unwrap_or_default().to_lowercase();
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        })
    }

    pub fn method(&self) -> reqwest::Method {
        if self.form_data.is_some() {
            return reqwest::Method::POST;
        }
        self.method
            .as_deref()
            .and_then(|m| reqwest::Method::from_bytes(m.trim().to_uppercase().as_bytes()).ok())
            .unwrap_or(reqwest::Method::GET)
    }

    /// A follow-up GET request for `url` that keeps this request's
    /// fetcher type, cookie jar token and retry budget.
    pub fn follow(&self, url: impl Into<String>) -> Self {
        Self {
            fetcher_type: self.fetcher_type,
            url: url.into(),
            method: None,
            form_data: None,
            user_token: self.user_token.clone(),
            infinite_scroll: self.infinite_scroll,
            retries: self.retries,
        }
    }
}

/// Anything that can download a page.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the document for `request`.
    async fn fetch(&self, request: &Request) -> std::result::Result<Vec<u8>, FetchError>;

    /// Cookie header the fetcher would send to `url` for `token`.
    fn cookies(&self, _token: &str, _url: &Url) -> Option<String> {
        None
    }

    /// Seed the cookie jar of `token` with a `Set-Cookie` style value.
    fn set_cookies(&self, _token: &str, _url: &Url, _cookies: &str) {}

    /// Drop the session kept for `token`.
    fn release(&self, _token: &str) {}
}

/// Routes each request to the fetcher its [`FetcherType`] names.
pub struct FetchDispatcher {
    base: Arc<dyn Fetcher>,
    chrome: Arc<dyn Fetcher>,
}

impl FetchDispatcher {
    pub fn new(base: Arc<dyn Fetcher>, chrome: Arc<dyn Fetcher>) -> Self {
        Self { base, chrome }
    }

    fn route(&self, fetcher_type: FetcherType) -> &Arc<dyn Fetcher> {
        match fetcher_type {
            FetcherType::Base => &self.base,
            FetcherType::Chrome => &self.chrome,
        }
    }
}

#[async_trait]
impl Fetcher for FetchDispatcher {
    async fn fetch(&self, request: &Request) -> std::result::Result<Vec<u8>, FetchError> {
        self.route(request.fetcher_type).fetch(request).await
    }

    fn cookies(&self, token: &str, url: &Url) -> Option<String> {
        self.base
            .cookies(token, url)
            .or_else(|| self.chrome.cookies(token, url))
    }

    fn set_cookies(&self, token: &str, url: &Url, cookies: &str) {
        self.base.set_cookies(token, url, cookies);
        self.chrome.set_cookies(token, url, cookies);
    }

    fn release(&self, token: &str) {
        self.base.release(token);
        self.chrome.release(token);
    }
}
