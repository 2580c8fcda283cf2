//! Composition root
//!
//! The [`Engine`] owns the configuration and the collaborators every task
//! needs. [`Engine::from_config`] builds the default stack; [`Engine::new`]
//! takes custom fetchers, stores or robots providers.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{
    CachingFetcher, FetchDispatcher, FetchStats, Fetcher, HttpFetcher, LoggingFetcher,
    RenderFetcher, RetryFetcher, StatsFetcher,
};
use crate::payload::Payload;
use crate::robots::{HttpRobotsProvider, RobotsProvider};
use crate::scrape::Task;
use crate::store::{new_store, Store};

/// Pause before the first retry of a transient fetch failure; later retries
/// wait proportionally longer.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct Engine {
    config: Arc<Config>,
    /// Outermost link of the fetch chain
    fetcher: Arc<StatsFetcher>,
    store: Arc<dyn Store>,
    robots: Arc<dyn RobotsProvider>,
}

impl Engine {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        robots: Arc<dyn RobotsProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(StatsFetcher::new(fetcher)),
            store,
            robots,
        }
    }

    /// Default stack: HTTP and rendering fetchers behind retry, HTML cache
    /// (unless storage is skipped) and logging, the configured store, and
    /// robots.txt over HTTP. Every engine counts its fetches on top.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = new_store(&config)?;

        let base: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config)?);
        let chrome: Arc<dyn Fetcher> = Arc::new(RenderFetcher::new(&config)?);
        let mut fetcher: Arc<dyn Fetcher> = Arc::new(FetchDispatcher::new(base, chrome));
        fetcher = Arc::new(RetryFetcher::new(fetcher, RETRY_BACKOFF));
        if !config.skip_storage {
            fetcher = Arc::new(CachingFetcher::new(fetcher, store.clone(), config.cache_ttl));
        }
        fetcher = Arc::new(LoggingFetcher::new(fetcher));

        let robots = Arc::new(HttpRobotsProvider::new(&config)?);
        info!(
            storage = ?config.storage_type,
            cache = !config.skip_storage,
            render_endpoint = %config.render_endpoint,
            "engine ready"
        );
        Ok(Self::new(config, fetcher, store, robots))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Fetches made by every task of this engine so far.
    pub fn stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    /// A new task for `payload`, sharing this engine's collaborators.
    pub fn task(&self, payload: Payload) -> Task {
        Task::new(
            payload,
            self.config.clone(),
            self.fetcher.clone(),
            self.store.clone(),
            self.robots.clone(),
        )
    }

    /// Run `payload` to completion and return the encoded output.
    pub async fn scrape(&self, payload: Payload) -> Result<Vec<u8>> {
        self.task(payload).parse().await
    }
}
