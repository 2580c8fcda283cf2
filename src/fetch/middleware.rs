//! Fetcher decorators.
//!
//! Each decorator owns the next fetcher in the chain and implements
//! [`Fetcher`] itself, so chains are plain values built once at startup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::{Fetcher, Request};
use crate::error::FetchError;
use crate::store::Store;

/// Logs every fetch with its outcome and duration.
pub struct LoggingFetcher {
    inner: Arc<dyn Fetcher>,
}

impl LoggingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Fetcher for LoggingFetcher {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let start = Instant::now();
        let result = self.inner.fetch(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(body) => info!(
                url = request.url(),
                fetcher = %request.fetcher_type,
                bytes = body.len(),
                elapsed_ms,
                "fetched"
            ),
            Err(e) => warn!(url = request.url(), fetcher = %request.fetcher_type, elapsed_ms, "fetch failed: {}", e),
        }
        result
    }

    fn cookies(&self, token: &str, url: &Url) -> Option<String> {
        self.inner.cookies(token, url)
    }

    fn set_cookies(&self, token: &str, url: &Url, cookies: &str) {
        self.inner.set_cookies(token, url, cookies)
    }

    fn release(&self, token: &str) {
        self.inner.release(token)
    }
}

/// Serves repeated GETs from a [`Store`] until the cached copy expires.
pub struct CachingFetcher {
    inner: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl CachingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { inner, store, ttl }
    }

    /// Cache key for a request, or `None` when the request must not be cached.
    fn cache_key(request: &Request) -> Option<String> {
        if request.form_data.is_some() || request.method() != reqwest::Method::GET {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(request.fetcher_type.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(request.url().as_bytes());
        Some(format!("html-{}", hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl Fetcher for CachingFetcher {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let Some(key) = Self::cache_key(request) else {
            return self.inner.fetch(request).await;
        };

        if !self.store.expired(&key).await {
            match self.store.read(&key).await {
                Ok(body) => {
                    debug!(url = request.url(), "cache hit");
                    return Ok(body);
                }
                Err(e) => warn!(url = request.url(), "cache read failed: {}", e),
            }
        }

        let body = self.inner.fetch(request).await?;
        if let Err(e) = self.store.write(&key, &body, self.ttl).await {
            warn!(url = request.url(), "cache write failed: {}", e);
        }
        Ok(body)
    }

    fn cookies(&self, token: &str, url: &Url) -> Option<String> {
        self.inner.cookies(token, url)
    }

    fn set_cookies(&self, token: &str, url: &Url, cookies: &str) {
        self.inner.set_cookies(token, url, cookies)
    }

    fn release(&self, token: &str) {
        self.inner.release(token)
    }
}

/// Retries transient failures `request.retries` times with linear backoff.
pub struct RetryFetcher {
    inner: Arc<dyn Fetcher>,
    backoff: Duration,
}

impl RetryFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, backoff: Duration) -> Self {
        Self { inner, backoff }
    }
}

#[async_trait]
impl Fetcher for RetryFetcher {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(request).await {
                Err(e) if e.is_transient() && attempt < request.retries => {
                    attempt += 1;
                    warn!(url = request.url(), attempt, "retrying after: {}", e);
                    tokio::time::sleep(self.backoff * attempt as u32).await;
                }
                result => return result,
            }
        }
    }

    fn cookies(&self, token: &str, url: &Url) -> Option<String> {
        self.inner.cookies(token, url)
    }

    fn set_cookies(&self, token: &str, url: &Url, cookies: &str) {
        self.inner.set_cookies(token, url, cookies)
    }

    fn release(&self, token: &str) {
        self.inner.release(token)
    }
}

/// Fetch counters of a [`StatsFetcher`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub requests: u64,
    pub failures: u64,
    pub bytes: u64,
}

/// Counts requests, failures and downloaded bytes through the chain.
pub struct StatsFetcher {
    inner: Arc<dyn Fetcher>,
    requests: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
}

impl StatsFetcher {
    pub fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self {
            inner,
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Fetcher for StatsFetcher {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.fetch(request).await;
        match &result {
            Ok(body) => {
                self.bytes.fetch_add(body.len() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn cookies(&self, token: &str, url: &Url) -> Option<String> {
        self.inner.cookies(token, url)
    }

    fn set_cookies(&self, token: &str, url: &Url, cookies: &str) {
        self.inner.set_cookies(token, url, cookies)
    }

    fn release(&self, token: &str) {
        self.inner.release(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    /// Fails with a 502 `failures` times, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for Flaky {
        async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::BadGateway {
                    url: request.url().to_string(),
                });
            }
            Ok(b"<html>ok</html>".to_vec())
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let fetcher = RetryFetcher::new(flaky.clone(), Duration::from_millis(1));
        let mut req = Request::new("http://a.com");
        req.retries = 2;
        assert!(fetcher.fetch(&req).await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let flaky = Arc::new(Flaky {
            failures: 5,
            calls: AtomicUsize::new(0),
        });
        let fetcher = RetryFetcher::new(flaky.clone(), Duration::from_millis(1));
        let mut req = Request::new("http://a.com");
        req.retries = 1;
        assert!(matches!(
            fetcher.fetch(&req).await,
            Err(FetchError::BadGateway { .. })
        ));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_serves_second_get() {
        let inner = Arc::new(Flaky {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let fetcher = CachingFetcher::new(
            inner.clone(),
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
        );
        let req = Request::new("http://a.com/list");
        fetcher.fetch(&req).await.unwrap();
        fetcher.fetch(&req).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let mut post = Request::new("http://a.com/login");
        post.form_data = Some("u=1".into());
        fetcher.fetch(&post).await.unwrap();
        fetcher.fetch(&post).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stats_count_outcomes() {
        let fetcher = StatsFetcher::new(Arc::new(Flaky {
            failures: 1,
            calls: AtomicUsize::new(0),
        }));
        let req = Request::new("http://a.com");
        assert!(fetcher.fetch(&req).await.is_err());
        assert!(fetcher.fetch(&req).await.is_ok());
        assert_eq!(
            fetcher.stats(),
            FetchStats {
                requests: 2,
                failures: 1,
                bytes: b"<html>ok</html>".len() as u64,
            }
        );
    }
}
