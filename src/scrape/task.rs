//! Task driver
//!
//! A [`Task`] runs a compiled [`Scraper`] against live pages. Each page is a
//! branch: it checks robots.txt, fetches, works out the next page and spawns
//! a branch for it, then extracts every block of the current page
//! concurrently. Blocks are persisted as soon as they are extracted; the
//! key index written at the end restores their order.
//!
//! Detail links start a nested tree with its own key index and UID, awaited
//! by the block that found them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use rand::Rng;
use scraper::Html;
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::{compile, Scraper};
use crate::config::Config;
use crate::encoders::Encoder;
use crate::error::{BadPayloadKind, Error, Result, StoreError};
use crate::extractors::ExtractContext;
use crate::fetch::{Fetcher, FetcherType, Request};
use crate::payload::{short_hash, Payload};
use crate::results::{self, fragment_key, Block, KeyIndex};
use crate::robots::{is_robots_txt, RobotsProvider, RobotsRules};
use crate::store::Store;

/// Pause between requests to the same host.
#[derive(Debug, Clone, Copy)]
struct FetchDelay {
    base: Duration,
    /// Scale by a random factor in [0.5, 1.5)
    randomize: bool,
    ignore: bool,
}

impl FetchDelay {
    fn duration(&self, crawl_delay: Option<Duration>) -> Duration {
        if self.ignore {
            return Duration::ZERO;
        }
        let base = crawl_delay.map_or(self.base, |d| d.max(self.base));
        if self.randomize && !base.is_zero() {
            let factor: u32 = rand::rng().random_range(500..1500);
            base * factor / 1000
        } else {
            base
        }
    }
}

/// State shared by every branch of a task, detail trees included.
struct Context {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    robots: Arc<dyn RobotsProvider>,
    /// Host to rules; `None` when robots.txt could not be fetched
    robots_cache: RwLock<HashMap<String, Option<RobotsRules>>>,
    delay: FetchDelay,
    errors: Mutex<Vec<String>>,
    parsed: AtomicBool,
}

impl Context {
    fn record(&self, err: &Error) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err.to_string());
    }

    fn cached_rules(&self, host: &str) -> Option<Option<RobotsRules>> {
        self.robots_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    async fn robots_rules(&self, url: &Url, host: &str) -> Option<RobotsRules> {
        if let Some(rules) = self.cached_rules(host) {
            return rules;
        }
        let rules = match self.robots.robots_data(url.as_str()).await {
            Ok(rules) => Some(rules),
            Err(e) => {
                warn!(%host, "robots.txt unavailable, assuming no restrictions: {}", e);
                None
            }
        };
        self.robots_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host.to_string())
            .or_insert(rules)
            .clone()
    }

    /// Disallowed URLs are recorded; with strict robots they also fail the
    /// branch.
    async fn check_robots(&self, url: &Url, host: &str) -> Result<()> {
        if is_robots_txt(url.as_str()) {
            return Ok(());
        }
        let rules = self.robots_rules(url, host).await;
        if self.robots.allowed(url.as_str(), rules.as_ref()) {
            return Ok(());
        }
        let err = Error::ForbiddenByRobots {
            url: url.to_string(),
        };
        if self.config.strict_robots {
            return Err(err);
        }
        warn!(%url, "disallowed by robots.txt");
        self.record(&err);
        Ok(())
    }

    /// Delay before fetching `request`, raised to the host's robots.txt
    /// crawl delay when it is longer.
    fn delay_before(&self, request: &Request) -> Duration {
        let crawl_delay = request
            .host()
            .ok()
            .and_then(|host| self.cached_rules(&host).flatten())
            .and_then(|rules| self.robots.crawl_delay(&rules));
        self.delay.duration(crawl_delay)
    }
}

/// One run of a payload.
pub struct Task {
    id: Uuid,
    payload: Payload,
    ctx: Arc<Context>,
}

impl Task {
    pub fn new(
        payload: Payload,
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        robots: Arc<dyn RobotsProvider>,
    ) -> Self {
        let delay = FetchDelay {
            base: payload
                .fetch_delay
                .map_or(config.fetch_delay, Duration::from_millis),
            randomize: payload.randomize_fetch_delay,
            ignore: config.ignore_fetch_delay,
        };
        Self {
            id: Uuid::now_v7(),
            payload,
            ctx: Arc::new(Context {
                config,
                fetcher,
                store,
                robots,
                robots_cache: RwLock::new(HashMap::new()),
                delay,
                errors: Mutex::new(Vec::new()),
                parsed: AtomicBool::new(false),
            }),
        }
    }

    /// Time-sortable task id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Creation time, recovered from the id.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        let (secs, nanos) = self.id.get_timestamp()?.to_unix();
        DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
    }

    /// Errors recorded by branches that did not stop the run.
    pub fn errors(&self) -> Vec<String> {
        self.ctx
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any block produced a value.
    pub fn parsed(&self) -> bool {
        self.ctx.parsed.load(Ordering::SeqCst)
    }

    /// Scrape everything the payload describes and return the encoded
    /// results.
    ///
    /// A run that parses nothing with the plain fetcher is retried with the
    /// rendering one, up to `render_fallback_retries` times.
    ///
    /// Without a user token the run gets a cookie session of its own, named
    /// after the task id and released at the end. A caller's token keeps its
    /// cookies in the store between runs.
    pub async fn parse(&self) -> Result<Vec<u8>> {
        let mut scraper = compile(&self.payload, &self.ctx.config)?;
        let caller_token = scraper.request.user_token.clone();
        let token = caller_token.clone().unwrap_or_else(|| self.id.to_string());
        scraper.request.user_token = Some(token.clone());
        let url = scraper.request.parsed_url()?;

        if caller_token.is_some() {
            self.restore_cookies(&token, &url).await;
        }
        let output = self.run(scraper).await;
        if caller_token.is_some() {
            self.save_cookies(&token, &url).await;
        }
        self.ctx.fetcher.release(&token);
        output
    }

    async fn run(&self, mut scraper: Scraper) -> Result<Vec<u8>> {
        let started = Instant::now();
        let uid = self.payload.uid()?;
        info!(task = %self.id, %uid, url = scraper.request.url(), "scrape started");

        let original_type = scraper.request.fetcher_type;
        let mut outcome = run_tree(self.ctx.clone(), scraper.clone(), uid.clone()).await;
        let mut fallbacks = 0;
        while !self.parsed()
            && original_type != FetcherType::Chrome
            && fallbacks < self.ctx.config.render_fallback_retries
        {
            fallbacks += 1;
            warn!(task = %self.id, attempt = fallbacks, "nothing parsed, retrying with the rendering fetcher");
            scraper = scraper.with_request(scraper.request.clone().with_type(FetcherType::Chrome));
            outcome = run_tree(self.ctx.clone(), scraper.clone(), uid.clone()).await;
        }
        if !self.parsed() {
            return Err(match outcome {
                Err(e) => e,
                Ok(()) => BadPayloadKind::EmptyResults.into(),
            });
        }

        let encoder = Encoder::for_format(
            &self.payload.format,
            scraper.columns(),
            self.payload.paginate_results,
        )?;
        let results = results::assemble(self.ctx.store.as_ref(), &uid).await?;
        let output = encoder.encode(&results)?;
        info!(
            task = %self.id,
            pages = results.pages.len(),
            blocks = results.all_blocks().len(),
            errors = self.errors().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape finished"
        );
        Ok(output)
    }

    /// Seed the session of `token` with the cookies saved by earlier runs.
    async fn restore_cookies(&self, token: &str, url: &Url) {
        match self.ctx.store.read(&cookies_key(token)).await {
            Ok(bytes) => {
                let cookies = String::from_utf8_lossy(&bytes);
                debug!(task = %self.id, %url, "restoring session cookies");
                self.ctx.fetcher.set_cookies(token, url, &cookies);
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => warn!(task = %self.id, "cannot read session cookies: {}", e),
        }
    }

    async fn save_cookies(&self, token: &str, url: &Url) {
        let Some(cookies) = self.ctx.fetcher.cookies(token, url) else {
            return;
        };
        if let Err(e) = self
            .ctx
            .store
            .write(&cookies_key(token), cookies.as_bytes(), Duration::ZERO)
            .await
        {
            warn!(task = %self.id, "cannot save session cookies: {}", e);
        }
    }
}

/// Store key of the cookies kept for a user token.
fn cookies_key(token: &str) -> String {
    format!("cookies-{}", short_hash(token.as_bytes()))
}

/// Run `scraper` and its pagination chain under `uid`, then persist the
/// key index. Returns the first page's outcome.
fn run_tree(ctx: Arc<Context>, scraper: Scraper, uid: String) -> BoxFuture<'static, Result<()>> {
    async move {
        let tracker = TaskTracker::new();
        let keys = Arc::new(Mutex::new(KeyIndex::new()));
        let root = TaskWorker {
            page: 0,
            scraper,
            keys: keys.clone(),
            uid: Arc::from(uid.as_str()),
            tracker: tracker.clone(),
        };

        let outcome = root.run(ctx.clone()).await;
        if let Err(e) = &outcome {
            error!(%uid, "first page failed: {}", e);
            ctx.record(e);
        }
        tracker.close();
        tracker.wait().await;

        let index = keys.lock().unwrap_or_else(PoisonError::into_inner).clone();
        ctx.store
            .write(&uid, &serde_json::to_vec(&index)?, Duration::ZERO)
            .await?;
        debug!(%uid, pages = index.len(), "key index stored");
        outcome
    }
    .boxed()
}

/// One page branch.
struct TaskWorker {
    page: usize,
    scraper: Scraper,
    /// Shared by every page of the tree
    keys: Arc<Mutex<KeyIndex>>,
    uid: Arc<str>,
    tracker: TaskTracker,
}

/// Part values of one block, extracted while the document was alive.
struct BlockDraft {
    index: usize,
    /// Part index to value, in part order
    values: Vec<(usize, Value)>,
}

struct PageDraft {
    next_url: Option<String>,
    blocks: Result<Vec<BlockDraft>>,
}

impl TaskWorker {
    fn run(self, ctx: Arc<Context>) -> BoxFuture<'static, Result<()>> {
        async move {
            let request = &self.scraper.request;
            let url = request.parsed_url()?;
            let host = request.host()?;
            ctx.check_robots(&url, &host).await?;

            let started = Instant::now();
            let body = ctx.fetcher.fetch(request).await?;
            let draft = draft_page(&self.scraper, &url, &body)?;

            if let Some(next) = draft.next_url {
                if self.page + 1 < self.scraper.max_pages {
                    self.spawn_next(&ctx, next);
                } else {
                    info!(page = self.page, max_pages = self.scraper.max_pages, "page limit reached");
                }
            }

            let blocks = draft.blocks?;
            info!(
                page = self.page,
                %url,
                blocks = blocks.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "page fetched"
            );

            // Only stored blocks are indexed, so fragments left by an earlier
            // run under the same UID are never read back.
            let workers = blocks.into_iter().map(|b| self.process_block(&ctx, b, &host));
            let written: Vec<usize> = join_all(workers).await.into_iter().flatten().collect();
            self.keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(self.page, written);
            Ok(())
        }
        .boxed()
    }

    fn spawn_next(&self, ctx: &Arc<Context>, next: String) {
        let child = TaskWorker {
            page: self.page + 1,
            scraper: self.scraper.with_request(self.scraper.request.follow(next)),
            keys: self.keys.clone(),
            uid: self.uid.clone(),
            tracker: self.tracker.clone(),
        };
        let ctx = ctx.clone();
        self.tracker.spawn(async move {
            let delay = ctx.delay_before(&child.scraper.request);
            if !delay.is_zero() {
                debug!(page = child.page, delay_ms = delay.as_millis() as u64, "waiting before next page");
                tokio::time::sleep(delay).await;
            }
            let page = child.page;
            let url = child.scraper.request.url().to_string();
            if let Err(e) = child.run(ctx.clone()).await {
                error!(page, %url, "page branch failed: {}", e);
                ctx.record(&e);
            }
        });
    }

    /// Extract and store one block. Returns its index when it was written.
    async fn process_block(&self, ctx: &Arc<Context>, draft: BlockDraft, host: &str) -> Option<usize> {
        let key = fragment_key(&self.uid, self.page, draft.index);
        let mut block = Block::new();
        for (part_index, value) in draft.values {
            let part = &self.scraper.parts[part_index];
            let details = match &part.details {
                Some(details) => {
                    let links = link_values(&value);
                    self.run_details(ctx, details, &links, &key, &part.name, host)
                        .await
                }
                None => None,
            };
            block.insert(part.name.clone(), value);
            if let Some(uids) = details {
                block.insert(part.details_key(), uids);
            }
        }

        if block.is_empty() {
            debug!(%key, "empty block");
            return None;
        }
        ctx.parsed.store(true, Ordering::SeqCst);
        let written = match serde_json::to_vec(&block) {
            Ok(bytes) => ctx
                .store
                .write(&key, &bytes, Duration::ZERO)
                .await
                .map_err(Error::from),
            Err(e) => Err(e.into()),
        };
        match written {
            Ok(()) => Some(draft.index),
            Err(e) => {
                error!(%key, "cannot store block: {}", e);
                ctx.record(&e);
                None
            }
        }
    }

    /// Scrape each detail link and return the UID (or UIDs) of the detail
    /// runs.
    async fn run_details(
        &self,
        ctx: &Arc<Context>,
        details: &Scraper,
        links: &[String],
        block_key: &str,
        part_name: &str,
        host: &str,
    ) -> Option<Value> {
        let mut uids = Vec::with_capacity(links.len());
        for (i, link) in links.iter().enumerate() {
            let uid = if links.len() == 1 {
                short_hash(format!("{block_key}{part_name}").as_bytes())
            } else {
                short_hash(format!("{block_key}{part_name}{i}").as_bytes())
            };
            let mut request = self.scraper.request.follow(link.clone());
            request.infinite_scroll = details.infinite_scroll;

            // Only same-host detail pages are throttled
            if request.host().is_ok_and(|h| h == host) {
                let delay = ctx.delay_before(&request);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            if let Err(e) = run_tree(ctx.clone(), details.with_request(request), uid.clone()).await {
                warn!(%link, "detail scrape failed: {}", e);
            }
            uids.push(Value::String(uid));
        }
        match uids.len() {
            0 => None,
            1 => uids.pop(),
            _ => Some(Value::Array(uids)),
        }
    }
}

/// Parse the page and extract everything needed from it, so the document
/// never outlives this call.
fn draft_page(scraper: &Scraper, url: &Url, body: &[u8]) -> Result<PageDraft> {
    let doc = Html::parse_document(&String::from_utf8_lossy(body));
    let next_url = if scraper.infinite_scroll {
        None
    } else {
        scraper.paginator.next_page(url.as_str(), &doc)?
    };

    let ctx = ExtractContext { base_url: Some(url) };
    let blocks = scraper.divider.divide(&doc).map(|blocks| {
        blocks
            .into_iter()
            .enumerate()
            .map(|(index, block)| BlockDraft {
                index,
                values: scraper
                    .parts
                    .iter()
                    .enumerate()
                    .filter_map(|(i, part)| part.extract(block, &ctx).map(|v| (i, v)))
                    .collect(),
            })
            .collect()
    });
    Ok(PageDraft { next_url, blocks })
}

/// Link strings in an href/src value.
fn link_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delay(base_ms: u64, randomize: bool, ignore: bool) -> FetchDelay {
        FetchDelay {
            base: Duration::from_millis(base_ms),
            randomize,
            ignore,
        }
    }

    #[test]
    fn test_fetch_delay() {
        assert_eq!(delay(500, false, false).duration(None), Duration::from_millis(500));
        assert_eq!(delay(500, true, true).duration(None), Duration::ZERO);
        assert_eq!(
            delay(500, false, false).duration(Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        for _ in 0..20 {
            let d = delay(1000, true, false).duration(None);
            assert!(d >= Duration::from_millis(500) && d < Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_link_values() {
        assert_eq!(link_values(&json!("http://a.com/1")), vec!["http://a.com/1"]);
        assert_eq!(link_values(&json!(["a", 1, "b"])), vec!["a", "b"]);
        assert!(link_values(&json!({"href": "x"})).is_empty());
    }

    #[test]
    fn test_draft_page() {
        let payload: Payload = serde_json::from_value(json!({
            "request": {"url": "http://shop.example.com/list"},
            "fields": [
                {"name": "Name", "selector": ".name", "extractor": {"types": ["text"]}},
                {"name": "Url", "selector": "a", "extractor": {"types": ["href"]}}
            ],
            "paginator": {"selector": ".next", "attr": "href", "maxPages": 3}
        }))
        .unwrap();
        let scraper = compile(&payload, &Config::default()).unwrap();
        let html = br#"
            <div class="card"><span class="name">One</span><a href="/p/1">go</a></div>
            <div class="card"><span class="name">Two</span></div>
            <a class="next" href="?page=2">more</a>"#;
        let url = Url::parse("http://shop.example.com/list").unwrap();
        let draft = draft_page(&scraper, &url, html).unwrap();
        assert_eq!(draft.next_url.as_deref(), Some("http://shop.example.com/list?page=2"));
        let blocks = draft.blocks.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0].values,
            vec![(0, json!("One")), (1, json!("http://shop.example.com/p/1"))]
        );
        assert_eq!(blocks[1].values, vec![(0, json!("Two"))]);
    }

    struct Offline;

    #[async_trait::async_trait]
    impl Fetcher for Offline {
        async fn fetch(&self, request: &Request) -> std::result::Result<Vec<u8>, crate::error::FetchError> {
            Err(crate::error::FetchError::NotFound {
                url: request.url().to_string(),
            })
        }
    }

    #[test]
    fn test_start_time_from_id() {
        let task = Task::new(
            Payload::default(),
            Arc::new(Config::default()),
            Arc::new(Offline),
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(crate::robots::AllowAll),
        );
        let started = task.start_time().unwrap();
        assert!((Utc::now() - started).num_seconds().abs() < 5);
        assert!(task.errors().is_empty());
        assert!(!task.parsed());
    }
}
