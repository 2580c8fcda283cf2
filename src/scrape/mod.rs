//! Scrape planning and execution
//!
//! A [`Payload`](crate::payload::Payload) compiles into a [`Scraper`]: the
//! immutable plan for one payload level. A [`Task`] drives that plan against
//! live pages, following pagination and detail links.

pub mod compiler;
pub mod divider;
pub mod paginator;
pub mod task;

pub use compiler::compile;
pub use divider::Divider;
pub use paginator::Paginator;
pub use task::Task;

use std::sync::Arc;

use scraper::{ElementRef, Selector};
use serde_json::Value;
use tracing::warn;

use crate::extractors::{ExtractContext, Extractor};
use crate::fetch::Request;

/// Selector meaning "the block itself".
pub const SELF_SELECTOR: &str = ".";

/// One extractor type of one field, ready to run.
#[derive(Debug, Clone)]
pub struct Part {
    /// `field_type`, unique within a scraper
    pub name: String,
    pub selector: String,
    /// Parsed selector, `None` for [`SELF_SELECTOR`]
    pub(crate) compiled: Option<Selector>,
    pub extractor: Arc<dyn Extractor>,
    /// Plan for the pages this part links to
    pub details: Option<Arc<Scraper>>,
}

impl Part {
    /// Run the extractor over this part's selection inside `block`.
    ///
    /// Extraction errors are logged and the part left out.
    pub fn extract(&self, block: ElementRef<'_>, ctx: &ExtractContext<'_>) -> Option<Value> {
        let selection: Vec<ElementRef<'_>> = match &self.compiled {
            Some(selector) => block.select(selector).collect(),
            None => vec![block],
        };
        match self.extractor.extract(&selection, ctx) {
            Ok(value) => value,
            Err(e) => {
                warn!(part = %self.name, "extraction failed: {}", e);
                None
            }
        }
    }

    /// Key under which detail run ids are stored in a block.
    pub fn details_key(&self) -> String {
        format!("{}_details", self.name)
    }
}

/// Compiled plan for one payload level. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Scraper {
    pub request: Request,
    pub divider: Divider,
    pub parts: Arc<[Part]>,
    pub paginator: Paginator,
    pub max_pages: usize,
    pub infinite_scroll: bool,
}

impl Scraper {
    /// The same plan bound to another request, used for pagination and
    /// detail pages.
    pub fn with_request(&self, request: Request) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }

    /// Part names in declaration order.
    pub fn part_names(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.name.clone()).collect()
    }

    /// CSV columns: structured parts expand into `part_key` columns and
    /// parts with details get a trailing `part_details` column.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for part in self.parts.iter() {
            let keys = part.extractor.columns();
            if keys.is_empty() {
                columns.push(part.name.clone());
            } else {
                columns.extend(keys.iter().map(|k| format!("{}_{}", part.name, k)));
            }
            if part.details.is_some() {
                columns.push(part.details_key());
            }
        }
        columns
    }
}
