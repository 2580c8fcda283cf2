//! Engine configuration.
//!
//! A plain struct handed to the compiler and the task driver at
//! construction time. [`Config::from_env`] reads `SCRAPE_*` variables
//! (after loading a `.env` file if one exists).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::StorageType;

const ENV_PREFIX: &str = "SCRAPE_";

#[derive(Debug, Clone)]
pub struct Config {
    /// Backend for fragments, key indexes and the HTML cache
    pub storage_type: StorageType,
    /// Base directory for the disk store
    pub storage_dir: PathBuf,
    /// Fetch delay used when a payload does not set one
    pub fetch_delay: Duration,
    /// Never sleep between page or detail fetches
    pub ignore_fetch_delay: bool,
    /// Page budget used when a paginator sets `maxPages` to 0
    pub default_max_pages: usize,
    /// Bypass the store-backed HTML cache in front of the fetchers
    pub skip_storage: bool,
    /// Splash-compatible rendering service for `chrome` requests
    pub render_endpoint: String,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// TTL of cached HTML pages
    pub cache_ttl: Duration,
    /// How many times an empty run is retried with the rendering fetcher
    pub render_fallback_retries: usize,
    /// Abort a page branch whose URL robots.txt disallows
    pub strict_robots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            storage_dir: PathBuf::from("./scrape-store"),
            fetch_delay: Duration::from_millis(500),
            ignore_fetch_delay: false,
            default_max_pages: 100,
            skip_storage: false,
            render_endpoint: "http://127.0.0.1:8050".to_string(),
            proxy: None,
            user_agent: concat!("scrape_kit/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
            render_fallback_retries: 1,
            strict_robots: false,
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    ///
    /// Unset variables keep their defaults; malformed values are an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(v) = get("STORAGE_TYPE") {
            config.storage_type = v.parse()?;
        }
        if let Some(v) = get("STORAGE_DIR") {
            config.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = get("FETCH_DELAY_MS") {
            config.fetch_delay = Duration::from_millis(parse_var("FETCH_DELAY_MS", &v)?);
        }
        if let Some(v) = get("IGNORE_FETCH_DELAY") {
            config.ignore_fetch_delay = parse_bool("IGNORE_FETCH_DELAY", &v)?;
        }
        if let Some(v) = get("MAX_PAGES") {
            config.default_max_pages = parse_var("MAX_PAGES", &v)?;
        }
        if let Some(v) = get("SKIP_STORAGE") {
            config.skip_storage = parse_bool("SKIP_STORAGE", &v)?;
        }
        if let Some(v) = get("RENDER_ENDPOINT") {
            config.render_endpoint = v;
        }
        if let Some(v) = get("PROXY") {
            config.proxy = Some(v).filter(|p| !p.is_empty());
        }
        if let Some(v) = get("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(parse_var("CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = get("RENDER_FALLBACK_RETRIES") {
            config.render_fallback_retries = parse_var("RENDER_FALLBACK_RETRIES", &v)?;
        }
        if let Some(v) = get("STRICT_ROBOTS") {
            config.strict_robots = parse_bool("STRICT_ROBOTS", &v)?;
        }

        Ok(config)
    }

    pub fn with_storage(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn ignore_fetch_delay(mut self) -> Self {
        self.ignore_fetch_delay = true;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.default_max_pages = max_pages;
        self
    }

    pub fn skip_storage(mut self) -> Self {
        self.skip_storage = true;
        self
    }

    pub fn with_render_fallback_retries(mut self, retries: usize) -> Self {
        self.render_fallback_retries = retries;
        self
    }

    pub fn strict_robots(mut self) -> Self {
        self.strict_robots = true;
        self
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{ENV_PREFIX}{name}: cannot parse {value:?}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got {value:?}"
        ))),
    }
}
