//! Script-rendering fetcher backed by a Splash-compatible HTTP service.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{Fetcher, Request};
use crate::config::Config;
use crate::error::FetchError;

/// Seconds the renderer waits after load so scripts can settle.
const RENDER_WAIT: &str = "0.5";

/// Fetches pages through `{endpoint}/render.html`, which loads the target
/// in a headless browser and returns the DOM after scripts ran.
pub struct RenderFetcher {
    endpoint: String,
    client: Client,
    timeout_secs: u64,
}

impl RenderFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            endpoint: config.render_endpoint.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.request_timeout.as_secs().max(1),
        })
    }

    fn render_url(&self, request: &Request) -> Result<Url, FetchError> {
        let target = Url::parse(request.url()).map_err(|e| FetchError::BadRequest(e.to_string()))?;
        let mut url = Url::parse(&format!("{}/render.html", self.endpoint))
            .map_err(|e| FetchError::BadRequest(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("url", target.as_str())
                .append_pair("wait", RENDER_WAIT)
                .append_pair("timeout", &self.timeout_secs.to_string());
            if let Some(form) = &request.form_data {
                query.append_pair("http_method", "POST").append_pair("body", form);
            }
            if request.infinite_scroll {
                query.append_pair("scroll", "1");
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Fetcher for RenderFetcher {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let url = self.render_url(request)?;
        debug!(target_url = request.url(), "render fetch");
        let response = self.client.get(url).send().await?;
        if let Some(err) = FetchError::from_status(response.status().as_u16(), request.url()) {
            return Err(err);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_url() {
        let config = Config {
            render_endpoint: "http://render:8050/".to_string(),
            ..Config::default()
        };
        let fetcher = RenderFetcher::new(&config).unwrap();
        let mut req = Request::new("http://shop.example.com/?q=a b");
        req.form_data = Some("x=1".into());

        let url = fetcher.render_url(&req).unwrap();
        assert!(url.as_str().starts_with("http://render:8050/render.html?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("url".into(), "http://shop.example.com/?q=a%20b".into())));
        assert!(pairs.contains(&("http_method".into(), "POST".into())));
    }
}
