use scraper::ElementRef;
use serde_json::Value;

use super::{collapse, ExtractContext, Extractor};
use crate::error::ExtractError;

/// Inner HTML of every selected element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Html;

impl Extractor for Html {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        _ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        Ok(collapse(
            selection
                .iter()
                .map(|el| Value::String(el.inner_html()))
                .collect(),
        ))
    }
}

/// Outer HTML of every selected element.
#[derive(Debug, Clone, Copy, Default)]
pub struct OuterHtml;

impl Extractor for OuterHtml {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        _ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        Ok(collapse(
            selection.iter().map(|el| Value::String(el.html())).collect(),
        ))
    }
}
