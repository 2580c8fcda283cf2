//! Declarative web scraping engine
//!
//! A [`Payload`] describes what to extract from a site:
//! - fields with CSS selectors and extractor types (text, links, images, regex, ...)
//! - pagination through result pages
//! - detail pages reached through extracted links
//! - output as JSON, CSV or XML
//!
//! The [`Engine`] compiles it into a plan and runs it as a [`Task`], fetching
//! pages concurrently, honoring robots.txt and fetch delays, and storing
//! every extracted block before assembling the final output.

pub mod config;
pub mod encoders;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod fetch;
pub mod logging;
pub mod payload;
pub mod results;
pub mod robots;
pub mod scrape;
pub mod store;

pub use config::Config;
pub use encoders::Encoder;
pub use engine::Engine;
pub use error::{Error, Result};
pub use payload::Payload;
pub use results::Results;
pub use scrape::{compile, Scraper, Task};
