//! robots.txt retrieval and checking

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use texting_robots::Robot;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::FetchError;

/// Parsed robots.txt for one host
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Source text; a `Robot` is rebuilt from it for each check
    robots_txt: String,
    user_agent: String,
    crawl_delay: Option<f64>,
}

impl RobotsRules {
    pub fn new(robots_txt: impl Into<String>, user_agent: impl Into<String>) -> Self {
        let robots_txt = robots_txt.into();
        let user_agent = user_agent.into();
        let crawl_delay = extract_crawl_delay(&robots_txt, &user_agent);
        Self {
            robots_txt,
            user_agent,
            crawl_delay,
        }
    }

    /// Rules that allow everything (missing robots.txt).
    pub fn allow_all(user_agent: impl Into<String>) -> Self {
        Self::new(String::new(), user_agent)
    }

    /// Check if `url` may be fetched
    pub fn allows(&self, url: &str) -> bool {
        Robot::new(&self.user_agent, self.robots_txt.as_bytes())
            .map(|r| r.allowed(url))
            .unwrap_or(true)
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Source of robots.txt rules.
#[async_trait]
pub trait RobotsProvider: Send + Sync {
    /// Retrieve and parse robots.txt for the host of `url`.
    async fn robots_data(&self, url: &str) -> Result<RobotsRules, FetchError>;

    /// Missing rules allow everything.
    fn allowed(&self, url: &str, rules: Option<&RobotsRules>) -> bool {
        rules.map_or(true, |r| r.allows(url))
    }

    fn crawl_delay(&self, rules: &RobotsRules) -> Option<Duration> {
        rules.crawl_delay()
    }
}

/// Fetches robots.txt over plain HTTP.
pub struct HttpRobotsProvider {
    client: Client,
    user_agent: String,
}

impl HttpRobotsProvider {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

#[async_trait]
impl RobotsProvider for HttpRobotsProvider {
    async fn robots_data(&self, url: &str) -> Result<RobotsRules, FetchError> {
        let robots_url = robots_url(url)?;
        debug!(%robots_url, "fetching robots.txt");
        let response = self.client.get(&robots_url).send().await?;
        let status = response.status();

        // No robots.txt = allow all
        if status.is_client_error() {
            return Ok(RobotsRules::allow_all(&self.user_agent));
        }
        if let Some(err) = FetchError::from_status(status.as_u16(), &robots_url) {
            return Err(err);
        }
        let body = response.text().await?;
        Ok(RobotsRules::new(body, &self.user_agent))
    }
}

/// Provider that never restricts anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl RobotsProvider for AllowAll {
    async fn robots_data(&self, _url: &str) -> Result<RobotsRules, FetchError> {
        Ok(RobotsRules::allow_all("*"))
    }
}

/// robots.txt location for the host of `url`
pub fn robots_url(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url.trim()).map_err(|e| FetchError::BadRequest(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| FetchError::BadRequest(format!("no host in {url}")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}/robots.txt", parsed.scheme(), host, port),
        None => format!("{}://{}/robots.txt", parsed.scheme(), host),
    })
}

pub fn is_robots_txt(url: &str) -> bool {
    Url::parse(url.trim())
        .map(|u| u.path() == "/robots.txt")
        .unwrap_or(false)
}

/// Crawl-delay of the group naming `user_agent`, else of the `*` group.
///
/// Consecutive `User-agent` lines open one group; the first delay seen in a
/// group applies to every agent it names.
fn extract_crawl_delay(robots_txt: &str, user_agent: &str) -> Option<f64> {
    let ua_lower = user_agent.to_lowercase();
    let mut names_us = false;
    let mut names_any = false;
    let mut reading_agents = false;
    let mut ours: Option<f64> = None;
    let mut wildcard: Option<f64> = None;

    for line in robots_txt.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        if let Some(agent) = lower.strip_prefix("user-agent:") {
            if !reading_agents {
                names_us = false;
                names_any = false;
            }
            reading_agents = true;
            match agent.trim() {
                "*" => names_any = true,
                "" => {}
                agent => names_us |= ua_lower.contains(agent),
            }
            continue;
        }

        reading_agents = false;
        if let Some(delay) = lower
            .strip_prefix("crawl-delay:")
            .and_then(|d| d.trim().parse::<f64>().ok())
        {
            if names_us && ours.is_none() {
                ours = Some(delay);
            }
            if names_any && wildcard.is_none() {
                wildcard = Some(delay);
            }
        }
    }

    ours.or(wildcard)
}
