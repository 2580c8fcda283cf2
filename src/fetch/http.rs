//! Plain HTTP fetcher.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{Fetcher, Request};
use crate::config::Config;
use crate::error::FetchError;

/// Downloads pages as-is, without running scripts.
///
/// Requests carrying a `user_token` share one cookie jar per token, so a
/// login or session cookie set on page 1 is sent again on page 2.
pub struct HttpFetcher {
    config: Config,
    client: Client,
    sessions: RwLock<HashMap<String, (Client, Arc<Jar>)>>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = build_client(config, None)?;
        Ok(Self {
            config: config.clone(),
            client,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    fn session(&self, token: &str) -> Result<(Client, Arc<Jar>), FetchError> {
        if let Ok(sessions) = self.sessions.read() {
            if let Some(session) = sessions.get(token) {
                return Ok(session.clone());
            }
        }

        let jar = Arc::new(Jar::default());
        let client = build_client(&self.config, Some(jar.clone()))?;
        if let Ok(mut sessions) = self.sessions.write() {
            let entry = sessions
                .entry(token.to_string())
                .or_insert((client, jar));
            return Ok(entry.clone());
        }
        Ok((client, jar))
    }

    fn client_for(&self, request: &Request) -> Result<Client, FetchError> {
        match request.user_token.as_deref() {
            Some(token) => self.session(token).map(|(client, _)| client),
            None => Ok(self.client.clone()),
        }
    }
}

fn build_client(config: &Config, jar: Option<Arc<Jar>>) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout);
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    Ok(builder.build()?)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let url = Url::parse(request.url()).map_err(|e| FetchError::BadRequest(e.to_string()))?;
        let client = self.client_for(request)?;

        let mut builder = client.request(request.method(), url.clone());
        if let Some(form) = &request.form_data {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form.clone());
        }

        debug!(url = %url, method = %request.method(), "http fetch");
        let response = builder.send().await?;
        if let Some(err) = FetchError::from_status(response.status().as_u16(), url.as_str()) {
            return Err(err);
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn cookies(&self, token: &str, url: &Url) -> Option<String> {
        let sessions = self.sessions.read().ok()?;
        let (_, jar) = sessions.get(token)?;
        jar.cookies(url)
            .and_then(|value| value.to_str().ok().map(String::from))
    }

    fn set_cookies(&self, token: &str, url: &Url, cookies: &str) {
        if let Ok((_, jar)) = self.session(token) {
            for cookie in cookies.split(';').map(str::trim).filter(|c| !c.is_empty()) {
                jar.add_cookie_str(cookie, url);
            }
        }
    }

    fn release(&self, token: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        if removed.is_some() {
            debug!(token, "session released");
        }
    }
}
